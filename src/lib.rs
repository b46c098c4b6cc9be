pub mod bridge;
pub mod config;

pub use bridge::{BridgeError, BridgeResult, ErrorKind, McpBridge, Operation};
pub use config::BridgeConfig;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

/// Return the platform-standard data directory for the bridge.
///
/// - macOS: `~/Library/Application Support/mcp-bridge/`
/// - Windows: `{FOLDERID_RoamingAppData}\mcp-bridge\`
/// - Linux: `$XDG_DATA_HOME/mcp-bridge/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.mcp-bridge/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-bridge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-bridge")
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr unless `log_dir` is given, in which case `bridge.log`
/// in that directory is rotated (keeping the last 3) and written through a
/// line-flushing writer. `json` switches to the JSON formatter.
pub fn init_tracing(log_dir: Option<&Path>, json: bool) -> io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_bridge=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let Some(log_dir) = log_dir else {
        let builder = builder.with_writer(std::io::stderr);
        if json {
            builder.json().init();
        } else {
            builder.init();
        }
        return Ok(());
    };

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("bridge.log");

    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let builder = builder
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== mcp-bridge starting ==="
    );
    Ok(())
}

/// Shift `bridge.log` to `bridge.log.1`, `.1` to `.2` and so on, dropping
/// whatever falls past `keep`.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let numbered = |n: u32| PathBuf::from(format!("{}.{n}", base_path.display()));

    let _ = std::fs::remove_file(numbered(keep));
    for n in (1..keep).rev() {
        let _ = std::fs::rename(numbered(n), numbered(n + 1));
    }
    let _ = std::fs::rename(base_path, numbered(1));
}

/// Log file handle shared by every subscriber writer; flushes on each write.
#[derive(Clone)]
struct FlushingWriter(Arc<Mutex<File>>);

impl FlushingWriter {
    fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(file)))
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        op(&mut file)
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            let n = file.write(buf)?;
            file.flush()?;
            Ok(n)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_log_file_shifts_chain() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("bridge.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(tmp.path().join("bridge.log.1"), "one").unwrap();
        std::fs::write(tmp.path().join("bridge.log.3"), "oldest").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let read = |name: &str| std::fs::read_to_string(tmp.path().join(name)).unwrap();
        assert_eq!(read("bridge.log.1"), "current");
        assert_eq!(read("bridge.log.2"), "one");
        assert!(!tmp.path().join("bridge.log.3").exists());
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.log");
        let file = File::create(&path).unwrap();
        let mut writer = FlushingWriter::new(file);
        writer.write_all(b"line\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[test]
    fn test_data_dir_is_named() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name == "mcp-bridge" || name == ".mcp-bridge");
    }
}
