use std::cmp;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use log::{error, info, warn};

use crate::camera_auth::CredentialStore;
use crate::common::{CameraId, CameraMap, CameraRecord, UserMap, UserRecord};
use crate::error::RegistryError;



#[derive(Debug)]
#[derive(Default)]
#[derive(Serialize, Deserialize)]
struct RegistryData {
	#[serde(default)]
	cameras: CameraMap,
	#[serde(default)]
	users: UserMap,
}

/// Cameras and operator accounts, kept in memory and written back to a YAML file after every
/// change.
pub struct Registry {
	path: Option<PathBuf>,
	data: RwLock<RegistryData>,
}

impl Registry {
	/// Loads the registry from `path`. A file that is missing or unreadable yields an empty
	/// registry, which is normal on first start.
	pub fn open(path: Option<PathBuf>) -> Self {
		let data = match &path {
			Some(path) => read_registry_file(path),
			None => RegistryData::default(),
		};
		Registry {
			path,
			data: RwLock::new(data),
		}
	}

	#[cfg(test)]
	pub fn in_memory(cameras: Vec<CameraRecord>) -> Self {
		let cameras = cameras.into_iter()
			.map(|camera| (camera.id.clone(), camera))
			.collect();
		Registry {
			path: None,
			data: RwLock::new(RegistryData { cameras, users: UserMap::new() }),
		}
	}

	pub async fn list_cameras(&self) -> Vec<CameraRecord> {
		let data = self.data.read().await;
		let mut cameras: Vec<CameraRecord> = data.cameras.values().cloned().collect();
		cameras.sort_by(|a, b| a.id.cmp(&b.id));
		cameras
	}

	pub async fn get_camera(&self, id: &str) -> Option<CameraRecord> {
		self.data.read().await.cameras.get(id).cloned()
	}

	/// Inserts or replaces a camera. A camera without an ID gets the next free numeric one.
	pub async fn save_camera(&self, mut camera: CameraRecord) -> Result<CameraRecord, RegistryError> {
		validate_camera_url(&camera.base_url)?;

		let mut data = self.data.write().await;
		if camera.id.is_empty() {
			camera.id = next_camera_id(&data.cameras);
		} else {
			validate_camera_id(&camera.id)?;
		}
		data.cameras.insert(camera.id.clone(), camera.clone());
		self.write_registry_file(&data).await?;
		info!("Saved camera {}", camera.id);
		Ok(camera)
	}

	pub async fn delete_camera(&self, id: &str) -> Result<CameraRecord, RegistryError> {
		let mut data = self.data.write().await;
		let camera = data.cameras.remove(id)
			.ok_or_else(|| RegistryError::NotFound(format!("camera {}", id)))?;
		self.write_registry_file(&data).await?;
		info!("Deleted camera {}", id);
		Ok(camera)
	}

	pub async fn list_users(&self) -> Vec<String> {
		let data = self.data.read().await;
		let mut users: Vec<String> = data.users.keys().cloned().collect();
		users.sort();
		users
	}

	pub async fn has_users(&self) -> bool {
		!self.data.read().await.users.is_empty()
	}

	pub async fn insert_user(&self, username: &str, password: &str) -> Result<(), RegistryError> {
		if username.is_empty() {
			return Err(RegistryError::InvalidUser("username must not be empty".into()));
		}

		let password_hash = hash_password(password).await?;
		let mut data = self.data.write().await;
		if data.users.contains_key(username) {
			return Err(RegistryError::UserExists(username.to_owned()));
		}

		let user = UserRecord {
			username: username.to_owned(),
			password_hash,
		};
		data.users.insert(username.to_owned(), user);
		self.write_registry_file(&data).await?;
		info!("Added user {}", username);
		Ok(())
	}

	/// Returns whether the user existed.
	pub async fn delete_user(&self, username: &str) -> Result<bool, RegistryError> {
		let mut data = self.data.write().await;
		if data.users.remove(username).is_none() {
			return Ok(false);
		}
		self.write_registry_file(&data).await?;
		info!("Deleted user {}", username);
		Ok(true)
	}

	pub async fn verify_user(&self, username: &str, password: &str) -> bool {
		let password_hash = match self.data.read().await.users.get(username) {
			Some(user) => user.password_hash.clone(),
			None => return false,
		};

		let password = password.to_owned();
		match tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash)).await {
			Ok(Ok(matches)) => matches,
			Ok(Err(err)) => {
				error!("Stored password hash for {} is unusable; error was {}", username, err);
				false
			},
			Err(err) => {
				error!("Password check for {} didn't finish; error was {}", username, err);
				false
			},
		}
	}

	async fn write_registry_file(&self, data: &RegistryData) -> Result<(), RegistryError> {
		let Some(path) = &self.path else {
			return Ok(());
		};

		let yaml = serde_yaml::to_string(data)?;
		let file = tokio::fs::File::create(path).await?;
		let mut writer = tokio::io::BufWriter::new(file);
		writer.write_all(yaml.as_bytes()).await?;
		writer.flush().await?;
		Ok(())
	}
}

#[rocket::async_trait]
impl CredentialStore for Registry {
	async fn lookup_camera(&self, id: &str) -> Option<CameraRecord> {
		self.get_camera(id).await
	}
}



fn read_registry_file(path: &Path) -> RegistryData {
	match File::open(path) {
		Ok(file) => {
			let buf_reader = BufReader::new(file);
			match serde_yaml::from_reader(buf_reader) {
				Ok(data) => data,
				Err(err) => {
					error!("Failed to read registry file {}; error was {}", path.display(), err);
					RegistryData::default()
				}
			}
		},
		Err(err) => {
			// Expected on first start, before anything was saved
			warn!("Failed to open registry file {} for reading; error was {}", path.display(), err);
			RegistryData::default()
		}
	}
}

fn next_camera_id(cameras: &CameraMap) -> CameraId {
	let mut highest_id: u64 = 0;
	for id in cameras.keys() {
		if let Ok(id) = id.parse::<u64>() {
			highest_id = cmp::max(highest_id, id);
		}
	}
	(highest_id + 1).to_string()
}

fn validate_camera_id(id: &str) -> Result<(), RegistryError> {
	let valid = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
	if valid {
		Ok(())
	} else {
		Err(RegistryError::InvalidCamera(format!("id {:?} may only contain letters, digits, '-' and '_'", id)))
	}
}

fn validate_camera_url(raw: &str) -> Result<(), RegistryError> {
	let url = url::Url::parse(raw)
		.map_err(|err| RegistryError::InvalidCamera(format!("url {:?}: {}", raw, err)))?;
	if url.host_str().map_or(true, str::is_empty) {
		return Err(RegistryError::InvalidCamera(format!("url {:?} has no host", raw)));
	}
	Ok(())
}

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

async fn hash_password(password: &str) -> Result<String, RegistryError> {
	let password = password.to_owned();
	tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST))
		.await
		.map_err(|err| RegistryError::Hash(err.to_string()))?
		.map_err(|err| RegistryError::Hash(err.to_string()))
}
