//! ES256 signing and verification of the metadata manifest.

use p256::ecdsa::signature::{RandomizedSigner, Verifier};
use p256::ecdsa::{DerSignature, Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use p256::SecretKey;
use rand::rngs::OsRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use x509_cert::der::DecodePem;
use x509_cert::Certificate;

use crate::error::{Error, IoContext, Result};
use crate::manifest::{self, FileRef, Jwt, Manifest};

/// Metadata files and directory names that make up a manifest.
#[derive(Clone, Debug)]
pub struct MetadataFiles {
    pub directory_file: PathBuf,
    pub symlink_file: PathBuf,
    pub regular_file: PathBuf,
    pub persistent_file: PathBuf,
    pub rootfs_directory: String,
    pub certificate_file: PathBuf,
    /// Included in the manifest only when the file exists.
    pub total_regular_size_file: PathBuf,
    pub compressed_rootfs_directory: Option<String>,
}

impl MetadataFiles {
    /// Hashes every listed file into a manifest.
    pub fn manifest(&self) -> Result<Manifest> {
        let total_regular_size = if self.total_regular_size_file.is_file() {
            let path = &self.total_regular_size_file;
            Some(fs::read_to_string(path).at(path)?)
        } else {
            None
        };

        Ok(Manifest {
            version: manifest::VERSION,
            directory: FileRef::from_path(&self.directory_file)?,
            symlink: FileRef::from_path(&self.symlink_file)?,
            regular: FileRef::from_path(&self.regular_file)?,
            persistent: FileRef::from_path(&self.persistent_file)?,
            rootfs_directory: self.rootfs_directory.clone(),
            certificate: FileRef::from_path(&self.certificate_file)?,
            total_regular_size,
            compressed_rootfs_directory: self.compressed_rootfs_directory.clone(),
        })
    }
}

/// Loads a P-256 private key from PKCS#8 or SEC1 PEM.
pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let pem = fs::read_to_string(path).at(path)?;
    if let Ok(key) = SigningKey::from_pkcs8_pem(&pem) {
        return Ok(key);
    }
    SecretKey::from_sec1_pem(&pem)
        .map(SigningKey::from)
        .map_err(|_| Error::Key(path.to_owned(), "not a PEM encoded P-256 private key".into()))
}

/// Loads the public key of an X.509 certificate in PEM form.
pub fn load_verifying_key(pem: &str) -> Result<VerifyingKey> {
    let cert = Certificate::from_pem(pem.as_bytes()).map_err(|err| Error::Certificate(err.to_string().into()))?;
    let point = cert
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::Certificate("public key has unused bits".into()))?;
    VerifyingKey::from_sec1_bytes(point).map_err(|_| Error::Certificate("not a P-256 public key".into()))
}

/// Signs `data` with a random nonce and returns the DER signature in base64.
pub fn sign_with(key: &SigningKey, data: &str) -> String {
    let signature: DerSignature = key.sign_with_rng(&mut OsRng, data.as_bytes());
    manifest::b64encode(signature.as_bytes())
}

pub fn sign(key_file: &Path, data: &str) -> Result<String> {
    let key = load_signing_key(key_file)?;
    Ok(sign_with(&key, data))
}

/// Builds and signs the manifest for `files`, returning the compact JWT.
pub fn sign_manifest(files: &MetadataFiles, key_file: &Path) -> Result<Jwt> {
    let key = load_signing_key(key_file)?;
    let header = manifest::header()?;
    let payload = files.manifest()?.encode()?;
    let signature = sign_with(&key, &format!("{}.{}", header, payload));
    Ok(Jwt {
        header,
        payload,
        signature,
    })
}

/// Writes `header.payload.signature` to `output`.
pub fn sign_metadata(files: &MetadataFiles, key_file: &Path, output: &Path) -> Result<()> {
    let jwt = sign_manifest(files, key_file)?;
    fs::write(output, jwt.to_string()).at(output)?;
    info!("wrote {}", output.display());
    Ok(())
}

/// Checks the signature of a JWT against a certificate and returns its manifest.
pub fn verify(jwt: &Jwt, certificate_pem: &str) -> Result<Manifest> {
    let key = load_verifying_key(certificate_pem)?;
    verify_with(jwt, &key)
}

/// Checks the signature of a JWT against a public key. DER and raw `r || s`
/// signatures are both accepted.
pub fn verify_with(jwt: &Jwt, key: &VerifyingKey) -> Result<Manifest> {
    let algorithm = jwt.algorithm()?;
    if algorithm != manifest::ALGORITHM {
        return Err(Error::Jwt(format!("unsupported algorithm {}", algorithm).into()));
    }

    let bytes = jwt.signature_bytes()?;
    let signature = match Signature::from_der(&bytes) {
        Ok(ok) => ok,
        Err(_) => Signature::from_slice(&bytes).map_err(|_| Error::Signature)?,
    };
    key.verify(jwt.signing_input().as_bytes(), &signature)
        .map_err(|_| Error::Signature)?;

    jwt.manifest()
}
