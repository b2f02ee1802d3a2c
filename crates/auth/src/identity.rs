//! Device identity: a long-lived Ed25519 keypair that uniquely identifies
//! this installation. Generated once at first boot and never rotated
//! automatically. The public half is handed out during pairing; the
//! private half signs RPC handshake challenges.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD as b64};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{Context, Error, Result};

/// Public half of a device identity, as persisted in `identity/device.json`
/// and handed out to pairing peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePublicIdentity {
    pub device_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// The full device identity, including the private signing key.
pub struct DeviceIdentity {
    pub device_id: String,
    signing_key: SigningKey,
}

#[derive(Serialize, Deserialize)]
struct PrivateFile {
    device_id: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

impl DeviceIdentity {
    /// Loads the identity from `dir`, generating and persisting a new
    /// keypair if none exists yet.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let public_path = dir.join("device.json");
        let private_path = dir.join("device-auth.json");

        if private_path.exists() {
            return Self::load(&private_path);
        }

        fs::create_dir_all(dir).context("creating identity directory")?;
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let device_id = uuid::Uuid::new_v4().to_string();

        let public = DevicePublicIdentity {
            device_id: device_id.clone(),
            public_key: b64.encode(signing_key.verifying_key().to_bytes()),
        };
        let private = PrivateFile {
            device_id: device_id.clone(),
            private_key: b64.encode(signing_key.to_bytes()),
        };

        write_json(&public_path, &public)?;
        write_private_json(&private_path, &private)?;

        Ok(Self {
            device_id,
            signing_key,
        })
    }

    fn load(private_path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(private_path).context("reading device identity")?;
        let parsed: PrivateFile =
            serde_json::from_str(&raw).context("parsing device identity")?;
        let bytes = b64
            .decode(parsed.private_key)
            .context("decoding device private key")?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::message("device private key is not 32 bytes"))?;
        Ok(Self {
            device_id: parsed.device_id,
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn public(&self) -> DevicePublicIdentity {
        DevicePublicIdentity {
            device_id: self.device_id.clone(),
            public_key: b64.encode(self.signing_key.verifying_key().to_bytes()),
        }
    }

    /// Sign a challenge nonce, returning a base64-encoded signature.
    pub fn sign(&self, nonce: &[u8]) -> String {
        let sig: Signature = self.signing_key.sign(nonce);
        b64.encode(sig.to_bytes())
    }
}

/// Verify a base64-encoded signature over `nonce` against a base64-encoded
/// Ed25519 public key. Used on the gateway side during the `proof` step.
pub fn verify_signature(public_key_b64: &str, nonce: &[u8], signature_b64: &str) -> Result<()> {
    let key_bytes = b64
        .decode(public_key_b64)
        .context("decoding claimed public key")?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| Error::message("public key is not 32 bytes"))?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).context("parsing claimed public key")?;

    let sig_bytes = b64
        .decode(signature_b64)
        .context("decoding claimed signature")?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Error::message("signature is not 64 bytes"))?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(nonce, &signature)
        .map_err(|_| Error::message("signature verification failed"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing identity file")?;
    fs::write(path, json).context("writing identity file")
}

/// Writes the private identity file with `0600` permissions on unix.
fn write_private_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing private identity")?;
    let mut file = fs::File::create(path).context("creating private identity file")?;
    file.write_all(json.as_bytes())
        .context("writing private identity file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .context("reading private identity metadata")?
            .permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms).context("restricting private identity permissions")?;
    }

    Ok(())
}

/// Default identity directory layout root, relative to a config dir.
pub fn default_identity_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("identity")
}
