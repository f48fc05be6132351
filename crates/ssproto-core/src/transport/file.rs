//! File mailbox transport.
//!
//! A recorder mounted as a drive takes commands through files under its
//! `SYSTEM` directory: the host writes `SYSTEM/DEV/COMMAND` and polls
//! `SYSTEM/DEV/RESPONSE`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace};

use super::traits::{DeviceTransport, TransportError};
use crate::protocol::constants::{COMMAND_FILE, RESPONSE_FILE, UPDATE_PACKAGE_FILE};

/// Transport over a mounted recorder's mailbox files.
#[derive(Debug, Clone)]
pub struct FileTransport {
    root: PathBuf,
    command: PathBuf,
    response: PathBuf,
    update_package: PathBuf,
}

impl FileTransport {
    /// Open the recorder mounted at `root`.
    #[instrument(level = "info", skip(root), fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, TransportError> {
        let root = root.as_ref().to_path_buf();
        if !root.join("SYSTEM").is_dir() {
            return Err(TransportError::NotFound(root.display().to_string()));
        }
        debug!("Recorder mailbox found");
        Ok(Self {
            command: root.join(COMMAND_FILE),
            response: root.join(RESPONSE_FILE),
            update_package: root.join(UPDATE_PACKAGE_FILE),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_file(path: &Path, data: &[u8]) -> Result<(), TransportError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| TransportError::WriteFailed(format!("{}: {e}", path.display())))?;
        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|e| TransportError::WriteFailed(format!("{}: {e}", path.display())))
    }
}

impl DeviceTransport for FileTransport {
    fn write_command(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        Self::write_file(&self.command, data)?;
        debug!(len = data.len(), "Command written");
        Ok(data.len())
    }

    fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError> {
        match fs::read(&self.response) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => {
                trace!(len = bytes.len(), "Response read");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.is_connected() {
                    Ok(None)
                } else {
                    Err(TransportError::Disconnected)
                }
            }
            Err(e) => Err(TransportError::ReadFailed(format!(
                "{}: {e}",
                self.response.display()
            ))),
        }
    }

    fn stage_update_package(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        Self::write_file(&self.update_package, data)?;
        debug!(len = data.len(), path = %self.update_package.display(), "Update package staged");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.root.join("SYSTEM").is_dir()
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
