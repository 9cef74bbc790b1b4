use std::path::PathBuf;
use wasibridge_sandbox::repro::{self, ReproCase};

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(repro::default_artifact_path);

    let case = ReproCase::load(&path)?;

    match repro::run_case(&case) {
        Ok(()) => {
            eprintln!(
                "OK: {} bytes in chunks of {} transferred intact.",
                case.payload.len(),
                case.chunk_size
            );
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "FAILED: transfer invariant violated.\n{}\n\nCase file: {}",
                e,
                path.display()
            );
            std::process::exit(1);
        }
    }
}
