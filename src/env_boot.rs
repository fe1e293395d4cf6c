use dotenv::dotenv;

/// Load .env from the current working directory; if missing, fall back to
/// the crate root and then the repository root (the Node back office keeps
/// the shared .env one level up).
pub fn ensure_dotenv() {
    if dotenv().is_ok() {
        return;
    }
    let root = env!("CARGO_MANIFEST_DIR");
    for candidate in [format!("{root}/.env"), format!("{root}/../.env")] {
        if dotenv::from_filename(&candidate).is_ok() {
            return;
        }
    }
}
