use crate::common::{VerifyError, Result, DevMode};
use crate::service::protocol::User;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::fs;
use std::io::Write;
use serde::{Serialize, Deserialize};

const STORAGE_VERSION: u32 = 1;
const SESSION_FILE: &str = "session.bincode";

/// Persisted login, kept between runs like a browser's local storage.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredSession {
    pub version: u32,
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
    pub saved_at: i64,
}

impl StoredSession {
    pub fn new(token: String, user: Option<User>) -> Self {
        Self {
            version: STORAGE_VERSION,
            token,
            user,
            saved_at: chrono::Utc::now().timestamp(),
        }
    }
}

// User is stored as JSON text inside the bincode envelope; bincode cannot
// round-trip the skip_serializing_if fields on the wire types.
#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    token: String,
    user_json: Option<String>,
    saved_at: i64,
}

pub struct TokenStore {
    data_dir: PathBuf,
}

impl TokenStore {
    pub fn new_with_path(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn new_with_dev_mode(dev_mode: &DevMode) -> Result<Self> {
        let data_dir = match dev_mode.session_dir() {
            Some(dir) => dir,
            None => {
                let dirs = ProjectDirs::from("com", "idverify", "IdVerify")
                    .ok_or_else(|| VerifyError::Storage("Failed to get project dirs".into()))?;
                dirs.data_dir().to_path_buf()
            }
        };

        fs::create_dir_all(&data_dir)?;

        if dev_mode.is_enabled() {
            tracing::debug!("TokenStore using dev directory: {:?}", data_dir);
        }

        Ok(Self { data_dir })
    }

    fn session_file(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        let user_json = session
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| VerifyError::Storage(format!("Failed to serialize user: {}", e)))?;
        let envelope = Envelope {
            version: session.version,
            token: session.token.clone(),
            user_json,
            saved_at: session.saved_at,
        };
        let encoded = bincode::serialize(&envelope)
            .map_err(|e| VerifyError::Storage(format!("Failed to serialize: {}", e)))?;
        write_private(&self.session_file(), &encoded)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        let path = self.session_file();
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read(&path)?;
        let envelope: Envelope = match bincode::deserialize(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Discarding unreadable session file {:?}: {}", path, e);
                self.clear()?;
                return Ok(None);
            }
        };

        if envelope.version > STORAGE_VERSION {
            return Err(VerifyError::Storage(format!(
                "Session file version {} is newer than supported {}",
                envelope.version, STORAGE_VERSION
            )));
        }

        let user = envelope
            .user_json
            .as_deref()
            .map(serde_json::from_str::<User>)
            .transpose()
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring cached user: {}", e);
                None
            });

        Ok(Some(StoredSession {
            version: STORAGE_VERSION,
            token: envelope.token,
            user,
            saved_at: envelope.saved_at,
        }))
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.session_file();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Writes `data` readable by the owner only; the file holds a bearer token.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(data)?;
    Ok(())
}
