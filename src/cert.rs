use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};

use crate::config;
use crate::error::{Error, IoContext, Result};

/// A self-signed P-256 certificate and its private key, created with openssl.
#[derive(Clone, Debug)]
pub struct CertRequest {
    pub output_dir: PathBuf,
    pub subject: String,
    pub days: u32,
}

impl CertRequest {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        CertRequest {
            output_dir: output_dir.into(),
            subject: config::CERT_SUBJECT.to_string(),
            days: config::CERT_DAYS,
        }
    }

    pub fn key_path(&self) -> PathBuf {
        self.output_dir.join(config::PRIVATE_KEY_FILE)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.output_dir.join(config::CERTIFICATE_FILE)
    }

    pub fn command(&self) -> process::Command {
        let mut command = process::Command::new("openssl");
        command
            .arg("req")
            .arg("-x509")
            .arg("-nodes")
            .arg("-newkey")
            .arg("ec")
            .arg("-pkeyopt")
            .arg(format!("ec_paramgen_curve:{}", config::CERT_CURVE))
            .arg("-days")
            .arg(self.days.to_string())
            .arg("-subj")
            .arg(&self.subject)
            .arg("-keyout")
            .arg(self.key_path())
            .arg("-out")
            .arg(self.cert_path());
        command
    }

    /// Runs openssl and returns the key and certificate paths.
    pub fn run(&self) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&self.output_dir).at(&self.output_dir)?;

        let mut command = self.command();
        debug!("{:?}", command);
        let status = command.status().at(Path::new("openssl"))?;
        if !status.success() {
            return Err(Error::Command("openssl", status));
        }

        info!("wrote {} and {}", self.key_path().display(), self.cert_path().display());
        Ok((self.key_path(), self.cert_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn openssl_arguments() {
        let request = CertRequest::new("/tmp/keys");
        let command = request.command();

        assert_eq!(command.get_program(), "openssl");
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(
            args,
            [
                "req",
                "-x509",
                "-nodes",
                "-newkey",
                "ec",
                "-pkeyopt",
                "ec_paramgen_curve:prime256v1",
                "-days",
                "7305",
                "-subj",
                "/C=JP/ST=Tokyo/O=TIER IV, Inc./CN=ota-metadata",
                "-keyout",
                "/tmp/keys/privatekey.pem",
                "-out",
                "/tmp/keys/certificate.pem",
            ]
            .iter()
            .map(OsStr::new)
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn custom_subject_and_validity() {
        let request = CertRequest {
            subject: "/CN=test".to_string(),
            days: 1,
            ..CertRequest::new(".")
        };
        let args: Vec<String> = request
            .command()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-subj", "/CN=test"]));
        assert!(args.windows(2).any(|w| w == ["-days", "1"]));
    }
}
