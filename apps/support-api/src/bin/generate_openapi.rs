//! Writes the support-api OpenAPI document.
//!
//! Defaults to `specs/support-api.json` at the repository root; pass a path
//! to write elsewhere.

use std::path::PathBuf;

use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let doc = support_api::routes::ApiDoc::openapi().to_pretty_json()?;
    let out = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs/support-api.json"));

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out, doc)?;
    println!("Wrote {}", out.display());
    Ok(())
}
