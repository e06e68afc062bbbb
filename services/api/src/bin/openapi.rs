//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document of the REST surface, for client generation
//! and review without starting the server.
//!
//! Usage: `openapi [OUTPUT]` (defaults to `openapi.json`, `-` for stdout).

use api_lib::web::rest::ApiDoc;
use std::io::Write;
use utoipa::OpenApi;

fn main() -> std::io::Result<()> {
    let target = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());

    let doc = ApiDoc::openapi();
    let json = doc
        .to_pretty_json()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    if target == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        return stdout.write_all(b"\n");
    }

    std::fs::write(&target, json)?;
    eprintln!("Wrote {} paths to {}", doc.paths.paths.len(), target);
    Ok(())
}
