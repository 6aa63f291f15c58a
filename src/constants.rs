use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://raices.madrid.org";
pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const LOGIN_PATH: &str = "/raiz_app/jsp/pasendroid/login";
pub const USER_PARAM: &str = "USUARIO";
pub const PASS_PARAM: &str = "CLAVE";
pub const VER_PARAM: &str = "p";
pub const VER_STRING: &str = r#"{"version":"1.0.23"}"#;
pub const SESSION_COOKIE: &str = "JSESSIONID";

pub const MSG_PATH: &str = "/raiz_app/jsp/pasendroid/mensajeria";
pub const PAGE_PARAM: &str = "PAGINA";
pub const MSGS_PER_PAGE: usize = 10;

pub const ATTACHMENT_PATH: &str = "/raiz_app/jsp/pasendroid/adjuntos";
pub const ATTACHMENT_PARAM: &str = "X_ADJMENSAL";

pub const STATUS_CODE_OK: &str = "C";

// Time strings reported by Raíces are always CET/CEST
pub const PORTAL_TZ: chrono_tz::Tz = chrono_tz::CET;
pub const DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

pub fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}
