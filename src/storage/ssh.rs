use super::retention::{select_expired, RemoteEntry};
use super::{file_name_of, io_err, partial_name, remote_join, PruneOutcome, Result, StorageBackend, StorageError};
use crate::config::SshConfig;
use chrono::{TimeZone, Utc};
use ssh2::{Session, Sftp};
use std::fs::{self, File};
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const NAME: &str = "ssh";

/// SFTP transfer over SSH, authenticated by identity file or password
#[derive(Debug, Clone)]
pub struct SshStorage {
    config: SshConfig,
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

/// Create every missing directory of an absolute or relative remote path
fn ensure_remote_dir(sftp: &Sftp, path: &str) {
    let mut current = if path.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    for part in path.split('/').filter(|p| !p.is_empty()) {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);
        // Already existing directories fail here, which is fine
        let _ = sftp.mkdir(Path::new(&current), 0o755);
    }
}

impl SshStorage {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn connect(&self) -> Result<(Session, Sftp)> {
        let address = (self.config.host.as_str(), self.config.port);
        debug!("Connecting to {}:{}", self.config.host, self.config.port);

        let tcp = TcpStream::connect(address).map_err(connection_err)?;
        let mut session = Session::new().map_err(connection_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(connection_err)?;

        if let Some(identity) = &self.config.identify_file {
            session
                .userauth_pubkey_file(&self.config.user, None, identity, None)
                .map_err(connection_err)?;
        } else if let Some(password) = &self.config.password {
            session
                .userauth_password(&self.config.user, password.expose())
                .map_err(connection_err)?;
        }

        if !session.authenticated() {
            return Err(connection_err(format!(
                "authentication failed for {}@{}",
                self.config.user, self.config.host
            )));
        }

        let sftp = session.sftp().map_err(connection_err)?;
        Ok((session, sftp))
    }

    fn remote_path(&self, name: &str) -> String {
        remote_join(&self.config.remote_path, name)
    }

    fn list(&self, sftp: &Sftp) -> Result<Vec<RemoteEntry>> {
        let dir = if self.config.remote_path.is_empty() {
            "."
        } else {
            self.config.remote_path.as_str()
        };

        let listing = sftp.readdir(Path::new(dir)).map_err(transfer_err)?;
        let entries = listing
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                let secs = i64::try_from(stat.mtime?).ok()?;
                let modified = Utc.timestamp_opt(secs, 0).single()?;
                Some(RemoteEntry { name, modified })
            })
            .collect();

        Ok(entries)
    }
}

impl StorageBackend for SshStorage {
    fn name(&self) -> &'static str {
        NAME
    }

    fn location(&self, file_name: &str) -> String {
        format!("{}:{}", self.config.host, self.remote_path(file_name))
    }

    fn upload(&self, local_path: &Path) -> Result<()> {
        let name = file_name_of(local_path)?;
        let (_session, sftp) = self.connect()?;
        info!("Copying backup file to the remote server...");

        ensure_remote_dir(&sftp, &self.config.remote_path);
        let partial = self.remote_path(&partial_name(&name));
        let target = self.remote_path(&name);

        let mut local = File::open(local_path).map_err(io_err(local_path))?;
        {
            let mut remote = sftp.create(Path::new(&partial)).map_err(transfer_err)?;
            if let Err(e) = io::copy(&mut local, &mut remote) {
                let _ = sftp.unlink(Path::new(&partial));
                return Err(transfer_err(e));
            }
        }

        // SFTP v3 refuses to rename over an existing file
        if sftp.rename(Path::new(&partial), Path::new(&target), None).is_err() {
            let _ = sftp.unlink(Path::new(&target));
            sftp.rename(Path::new(&partial), Path::new(&target), None)
                .map_err(transfer_err)?;
        }

        info!("Copying backup file to the remote server...done");
        Ok(())
    }

    fn download(&self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        let (_session, sftp) = self.connect()?;
        let source = self.remote_path(remote_name);

        if sftp.stat(Path::new(&source)).is_err() {
            return Err(StorageError::NotFound {
                backend: NAME,
                name: remote_name.to_string(),
            });
        }

        info!("Copying backup file from the remote server...");
        fs::create_dir_all(local_dir).map_err(io_err(local_dir))?;
        let target = local_dir.join(remote_name);
        let partial = local_dir.join(partial_name(remote_name));

        let mut remote = sftp.open(Path::new(&source)).map_err(transfer_err)?;
        let copied = File::create(&partial)
            .and_then(|mut file| io::copy(&mut remote, &mut file).map(|_| file))
            .and_then(|file| file.sync_all());
        if let Err(e) = copied {
            let _ = fs::remove_file(&partial);
            return Err(io_err(&partial)(e));
        }
        fs::rename(&partial, &target).map_err(io_err(&target))?;

        info!("Copying backup file from the remote server...done");
        Ok(target)
    }

    fn prune(&self, retention_days: u32) -> Result<PruneOutcome> {
        let (_session, sftp) = self.connect()?;
        let expired = select_expired(&self.list(&sftp)?, Utc::now(), retention_days);

        let mut deleted = Vec::with_capacity(expired.len());
        for entry in expired {
            sftp.unlink(Path::new(&self.remote_path(&entry.name)))
                .map_err(transfer_err)?;
            deleted.push(entry.name);
        }

        Ok(PruneOutcome::Pruned { deleted })
    }
}
