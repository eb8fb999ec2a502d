use super::{file_name_of, io_err, partial_name, remote_join, PruneOutcome, Result, StorageBackend, StorageError};
use crate::config::FtpConfig;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info};

const NAME: &str = "ftp";

/// Plain FTP transfer in binary mode. Retention is not supported.
#[derive(Debug, Clone)]
pub struct FtpStorage {
    config: FtpConfig,
}

fn connection_err(message: impl std::fmt::Display) -> StorageError {
    StorageError::Connection {
        backend: NAME,
        message: message.to_string(),
    }
}

fn transfer_err(message: impl std::fmt::Display) -> StorageError {
    StorageError::Transfer {
        backend: NAME,
        message: message.to_string(),
    }
}

impl FtpStorage {
    pub fn new(config: &FtpConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn connect(&self) -> Result<FtpStream> {
        debug!("Connecting to {}:{}", self.config.host, self.config.port);
        let mut ftp = FtpStream::connect((self.config.host.as_str(), self.config.port))
            .map_err(connection_err)?;
        ftp.login(self.config.user.as_str(), self.config.password.expose())
            .map_err(connection_err)?;
        ftp.transfer_type(FileType::Binary).map_err(connection_err)?;
        Ok(ftp)
    }

    /// Change into the remote directory, creating missing components on the way
    fn enter_remote_dir(&self, ftp: &mut FtpStream, create: bool) -> Result<()> {
        let path = self.config.remote_path.as_str();
        if path.starts_with('/') {
            ftp.cwd("/").map_err(transfer_err)?;
        }

        for part in path.split('/').filter(|p| !p.is_empty()) {
            if ftp.cwd(part).is_ok() {
                continue;
            }
            if !create {
                return Err(transfer_err(format!("remote directory {} does not exist", path)));
            }
            ftp.mkdir(part).map_err(transfer_err)?;
            ftp.cwd(part).map_err(transfer_err)?;
        }
        Ok(())
    }
}

impl StorageBackend for FtpStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self, file_name: &str) -> String {
        let path = remote_join(&self.config.remote_path, file_name);
        format!(
            "ftp://{}:{}/{}",
            self.config.host,
            self.config.port,
            path.trim_start_matches('/')
        )
    }

    fn upload(&self, local_path: &Path) -> Result<()> {
        let name = file_name_of(local_path)?;
        let partial = partial_name(&name);
        let mut ftp = self.connect()?;
        info!("Copying backup file to FTP server...");

        self.enter_remote_dir(&mut ftp, true)?;

        let mut local = File::open(local_path).map_err(io_err(local_path))?;
        if let Err(e) = ftp.put_file(&partial, &mut local) {
            let _ = ftp.rm(&partial);
            return Err(transfer_err(e));
        }
        ftp.rename(&partial, &name).map_err(transfer_err)?;
        let _ = ftp.quit();

        info!("Copying backup file to FTP server...done");
        Ok(())
    }

    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let mut ftp = self.connect()?;
        self.enter_remote_dir(&mut ftp, false)?;

        let listing = ftp.nlst(None).map_err(transfer_err)?;
        let present = listing.iter().any(|entry| {
            entry.rsplit('/').next().unwrap_or(entry.as_str()) == remote_name
        });
        if !present {
            let _ = ftp.quit();
            return Err(StorageError::NotFound {
                backend: NAME,
                name: remote_name.to_string(),
            });
        }

        info!("Copying backup file from FTP server...");
        fs::create_dir_all(local_dir).map_err(io_err(local_dir))?;
        let target = local_dir.join(remote_name);
        let partial = local_dir.join(partial_name(remote_name));

        let mut stream = ftp.retr_as_stream(remote_name).map_err(transfer_err)?;
        let copied = File::create(&partial).and_then(|mut file| io::copy(&mut stream, &mut file));
        let finalized = ftp.finalize_retr_stream(stream);
        if let Err(e) = copied {
            let _ = fs::remove_file(&partial);
            return Err(io_err(&partial)(e));
        }
        if let Err(e) = finalized {
            let _ = fs::remove_file(&partial);
            return Err(transfer_err(e));
        }
        fs::rename(&partial, &target).map_err(io_err(&target))?;
        let _ = ftp.quit();

        info!("Copying backup file from FTP server...done");
        Ok(target)
    }

    fn prune(&self, _retention_days: u32) -> Result<PruneOutcome> {
        Ok(PruneOutcome::Unsupported)
    }
}
