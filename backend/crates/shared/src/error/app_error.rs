//! Application Error - Unified error type for the application
//!
//! Defines [`AppError`] struct and [`AppResult<T>`] type alias.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::kind::ErrorKind;

/// 内部原因として保持できるエラー型
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// アプリケーション統一エラー型
///
/// サービス境界を越える失敗を表します。
///
/// ## Fields
/// * `status_code` - HTTP ステータスコード（レスポンスのコードになる）
/// * `message` - クライアントに開示してよいメッセージ
/// * `cause` - 元のエラー（ログ専用、シリアライズされない）
///
/// `cause` は構築時にのみ設定でき、以後は読み取り専用です。
///
/// ## Examples
/// ```rust
/// use kernel::error::AppError;
///
/// let err = AppError::new(400, "missing field 'name'");
/// assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"message":"missing field 'name'"}"#);
///
/// let io = std::io::Error::other("disk full");
/// let err = AppError::internal(io);
/// assert_eq!(err.status_code(), 500);
/// assert_eq!(err.to_string(), "Internal Server Error: disk full");
/// ```
pub struct AppError {
    status_code: u16,
    message: Cow<'static, str>,
    cause: Option<BoxError>,
}

/// アプリケーション結果型エイリアス
///
/// ## Examples
/// ```rust
/// use kernel::error::{AppError, AppResult};
///
/// fn find_user(id: u32) -> AppResult<String> {
///     if id == 0 {
///         return Err(AppError::not_found("User not found"));
///     }
///     Ok("Alice".to_string())
/// }
/// ```
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// 新しいエラーを作成
    ///
    /// 失敗しません。`message` が空の場合はステータスの理由フレーズで置き換えます。
    ///
    /// ## Arguments
    /// * `status_code` - HTTP ステータスコード
    /// * `message` - ユーザー向けメッセージ
    pub fn new(status_code: u16, message: impl Into<Cow<'static, str>>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            Cow::Borrowed(fallback_message(status_code))
        } else {
            message
        };

        Self {
            status_code,
            message,
            cause: None,
        }
    }

    #[inline]
    fn of_kind(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind.status_code(), message)
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    /// 500 Internal Server Error
    ///
    /// メッセージは固定の汎用文言で、`cause` は診断ログにのみ使われます。
    pub fn internal(cause: impl Into<BoxError>) -> Self {
        Self::of_kind(
            ErrorKind::InternalServerError,
            ErrorKind::InternalServerError.as_str(),
        )
        .with_cause(cause)
    }

    /// 400 Bad Request エラー
    #[inline]
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::BadRequest, message)
    }

    /// 401 Unauthorized エラー
    #[inline]
    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::Unauthorized, message)
    }

    /// 403 Forbidden エラー
    #[inline]
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::Forbidden, message)
    }

    /// 404 Not Found エラー
    #[inline]
    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::NotFound, message)
    }

    /// 409 Conflict エラー
    #[inline]
    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::Conflict, message)
    }

    /// 410 Gone エラー
    #[inline]
    pub fn gone(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::Gone, message)
    }

    /// 422 Unprocessable Entity エラー
    #[inline]
    pub fn unprocessable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::UnprocessableEntity, message)
    }

    /// 429 Too Many Requests エラー
    #[inline]
    pub fn too_many_requests(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::TooManyRequests, message)
    }

    /// 503 Service Unavailable エラー
    #[inline]
    pub fn service_unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::of_kind(ErrorKind::ServiceUnavailable, message)
    }

    // ========================================================================
    // Builder methods
    // ========================================================================

    /// 元のエラーを設定（診断用）
    ///
    /// 値を消費して返すため、呼び出し側に渡った後の `AppError` の原因は変更できません。
    ///
    /// ## Examples
    /// ```rust
    /// use kernel::error::{AppError, AppResult};
    ///
    /// fn read_config() -> AppResult<String> {
    ///     std::fs::read_to_string("/nonexistent/config.json")
    ///         .map_err(|e| AppError::service_unavailable("Configuration unavailable").with_cause(e))
    /// }
    ///
    /// assert!(read_config().unwrap_err().cause().is_some());
    /// ```
    #[inline]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// HTTP ステータスコードを取得
    #[inline]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// エラー種別を取得（既知のステータスのみ）
    #[inline]
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_status_code(self.status_code)
    }

    /// クライアント向けメッセージを取得
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 元のエラーを取得
    #[inline]
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// サーバーエラーかどうか
    #[inline]
    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    /// クライアントエラーかどうか
    #[inline]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// レスポンスとして実際に送られるステータスコード
    ///
    /// HTTP として表現できないコード（100..=999 の範囲外）は 500 になります。
    #[inline]
    pub fn response_status_code(&self) -> u16 {
        if (100..1000).contains(&self.status_code) {
            self.status_code
        } else {
            ErrorKind::InternalServerError.status_code()
        }
    }

    /// 完全な診断情報（メッセージと原因）を現在の tracing ディスパッチャに記録
    ///
    /// 分類は [`response_status_code`](Self::response_status_code) に従います。
    /// 5xx は `ERROR`、原因を持つそれ以外のエラーは `WARN`、
    /// 原因のないクライアントエラーは `DEBUG` で記録します。
    /// レスポンス変換時に一度だけ呼ばれる想定です。
    pub fn report(&self) {
        let status = self.response_status_code();

        if status >= 500 {
            tracing::error!(status, error = %self, "request failed");
        } else if self.cause.is_some() {
            tracing::warn!(status, error = %self, "request rejected");
        } else {
            tracing::debug!(status, error = %self, "request rejected");
        }
    }
}

fn fallback_message(status_code: u16) -> &'static str {
    match ErrorKind::from_status_code(status_code) {
        Some(kind) => kind.as_str(),
        None if status_code >= 500 => ErrorKind::InternalServerError.as_str(),
        None => "Request Failed",
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self::of_kind(kind, kind.as_str())
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("AppError");
        builder.field("status_code", &self.status_code);
        builder.field("message", &self.message);
        if let Some(cause) = &self.cause {
            builder.field("cause", cause);
        }
        builder.finish()
    }
}

/// 内部ログ用の表現。`cause` があれば `"{message}: {cause}"` になります。
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// クライアント向けの表現。`message` のみを書き出し、`cause` は決して含めません。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut body = serializer.serialize_struct("AppError", 1)?;
        body.serialize_field("message", &self.message)?;
        body.end()
    }
}

// ============================================================================
// Result extension traits
// ============================================================================

/// `Result<T, E>` を `AppResult<T>` に変換するための拡張トレイト
pub trait ResultExt<T, E> {
    /// エラーを指定した種別とメッセージの `AppError` に変換し、元のエラーを原因として保持
    fn map_app_err(self, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> AppResult<T>
    where
        E: Error + Send + Sync + 'static;

    /// エラーを 500 Internal Server Error に変換
    fn or_internal(self) -> AppResult<T>
    where
        E: Error + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn map_app_err(self, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> AppResult<T>
    where
        E: Error + Send + Sync + 'static,
    {
        self.map_err(|e| AppError::of_kind(kind, message).with_cause(e))
    }

    fn or_internal(self) -> AppResult<T>
    where
        E: Error + Send + Sync + 'static,
    {
        self.map_err(AppError::internal)
    }
}

/// `Option<T>` を `AppResult<T>` に変換するための拡張トレイト
pub trait OptionExt<T> {
    /// `None` の場合に `AppError` を返す
    fn ok_or_app_err(self, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> AppResult<T>;

    /// `None` の場合に 404 Not Found を返す
    fn ok_or_not_found(self, message: impl Into<Cow<'static, str>>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_app_err(self, kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> AppResult<T> {
        self.ok_or_else(|| AppError::of_kind(kind, message))
    }

    fn ok_or_not_found(self, message: impl Into<Cow<'static, str>>) -> AppResult<T> {
        self.ok_or_app_err(ErrorKind::NotFound, message)
    }
}
