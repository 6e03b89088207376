//! Shared helpers for integration tests.

use base64::Engine as _;

/// Route `log` output through the test harness. Honors `RUST_LOG`;
/// repeated calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build an unsigned JWT whose `exp` claim is `offset_secs` from now.
pub fn make_jwt(offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    let header =
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"exp":{exp},"sub":"u-1"}}"#));
    format!("{header}.{payload}.sig")
}
