//! ONNX Runtime environment management.
//!
//! The runtime is initialised at most once per process. The first outcome,
//! success or failure, is recorded and replayed to every later caller so
//! that engine construction never observes a half-initialised runtime.

use std::path::PathBuf;
use std::sync::OnceLock;

use crate::{EngineError, NativeOptions};

static ORT_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise the ONNX Runtime environment, once.
pub(crate) fn ensure_runtime(options: &NativeOptions) -> Result<(), EngineError> {
    let outcome = ORT_INIT.get_or_init(|| {
        let lib_path = resolve_lib_path(options)?;
        tracing::debug!(path = %lib_path.display(), "loading onnxruntime");
        ort::init_from(lib_path.to_string_lossy())
            .with_name("vad-adapter")
            .commit()
            .map(|_| ())
            .map_err(|e| e.to_string())
    });
    outcome.clone().map_err(EngineError::Init)
}

/// Locate the ONNX Runtime shared library.
///
/// Search order:
/// 1. explicit override from the configuration
/// 2. `lib/<os>-<arch>/` relative to the executable
/// 3. `../lib/<os>-<arch>/` relative to the executable (bin/ layout)
/// 4. the same two paths relative to the CWD, only in dev mode
///
/// CWD lookup is off by default to prevent shared-library hijacking.
fn resolve_lib_path(options: &NativeOptions) -> Result<PathBuf, String> {
    if let Some(path) = &options.ort_lib_path {
        let meta = std::fs::metadata(path)
            .map_err(|_| format!("ort_lib_path {:?} does not exist", path))?;
        if meta.is_dir() {
            return Err(format!(
                "ort_lib_path {:?} is a directory, expected a file",
                path
            ));
        }
        return Ok(path.clone());
    }

    let platform_dir = format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH);
    let relative = PathBuf::from("lib").join(&platform_dir).join(lib_filename());
    let relative_parent = PathBuf::from("..").join(&relative);

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            for candidate in [&relative, &relative_parent] {
                let path = exe_dir.join(candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
    }

    if options.dev_mode {
        if let Ok(cwd) = std::env::current_dir() {
            for candidate in [&relative, &relative_parent] {
                let path = cwd.join(candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
    }

    Err(format!(
        "onnxruntime shared library not found; searched lib/{platform_dir}/{} relative to the \
         executable (set ort_lib_path to override, or enable dev_mode for CWD lookup)",
        lib_filename()
    ))
}

fn lib_filename() -> &'static str {
    match std::env::consts::OS {
        "macos" => "libonnxruntime.dylib",
        "windows" => "onnxruntime.dll",
        _ => "libonnxruntime.so",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_override_must_exist() {
        let options = NativeOptions {
            ort_lib_path: Some(PathBuf::from("/nonexistent/libonnxruntime.so")),
            dev_mode: false,
        };
        let err = resolve_lib_path(&options).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_explicit_override_rejects_directory() {
        let options = NativeOptions {
            ort_lib_path: Some(std::env::temp_dir()),
            dev_mode: false,
        };
        let err = resolve_lib_path(&options).unwrap_err();
        assert!(err.contains("directory"));
    }

    #[test]
    fn test_missing_library_names_search_path() {
        let options = NativeOptions::default();
        if let Err(err) = resolve_lib_path(&options) {
            assert!(err.contains("lib/"));
            assert!(err.contains("ort_lib_path"));
        }
    }
}
