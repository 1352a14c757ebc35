use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use super::monitor::Clock;
use super::{current_user, RequestHandler, Service, ServiceError};
use crate::models::profiles::{AvatarUpload, PinForm, PinStatus, Profile, ProfileForm, WalletForm};
use crate::models::session::Session;
use crate::repositories::profiles::ProfileRepository;
use crate::repositories::backend::BackendResult;
use crate::repositories::storage::{BucketSpec, ObjectStorage};
use crate::validation;

pub enum ProfileRequest {
    Get {
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
    Save {
        form: ProfileForm,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
    UploadAvatar {
        content_type: String,
        file_name: Option<String>,
        bytes: Vec<u8>,
        response: oneshot::Sender<Result<AvatarUpload, ServiceError>>,
    },
    GetWallet {
        response: oneshot::Sender<Result<WalletForm, ServiceError>>,
    },
    SaveWallet {
        form: WalletForm,
        response: oneshot::Sender<Result<WalletForm, ServiceError>>,
    },
    PinStatus {
        response: oneshot::Sender<Result<PinStatus, ServiceError>>,
    },
    SavePin {
        form: PinForm,
        response: oneshot::Sender<Result<PinStatus, ServiceError>>,
    },
}

pub fn avatar_bucket_spec(name: &str, max_bytes: u64) -> BucketSpec {
    BucketSpec {
        name: name.to_string(),
        public: true,
        file_size_limit: max_bytes,
        allowed_mime_types: vec!["image/*".to_string()],
    }
}

/// Creates the bucket unless it already exists. Returns whether it was
/// created.
pub async fn provision_bucket(storage: &dyn ObjectStorage, spec: &BucketSpec) -> BackendResult<bool> {
    if storage.bucket_exists(&spec.name).await? {
        return Ok(false);
    }

    storage.create_bucket(spec).await?;
    log::info!("Created storage bucket {}.", spec.name);

    Ok(true)
}

/// Extension for an uploaded image, from its file name or else its MIME
/// subtype.
pub fn avatar_extension(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    let subtype = content_type
        .split('/')
        .nth(1)
        .unwrap_or("img")
        .split(['+', ';'])
        .next()
        .unwrap_or("img")
        .trim();

    match subtype {
        "jpeg" => "jpg".to_string(),
        "" => "img".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

#[derive(Clone)]
pub struct ProfileRequestHandler {
    session: watch::Receiver<Option<Session>>,
    profiles: ProfileRepository,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    avatar_bucket: String,
    max_avatar_bytes: u64,
}

impl ProfileRequestHandler {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        profiles: ProfileRepository,
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
        avatar_bucket: String,
        max_avatar_bytes: u64,
    ) -> Self {
        Self {
            session,
            profiles,
            storage,
            clock,
            avatar_bucket,
            max_avatar_bytes,
        }
    }

    async fn get(&self) -> Result<Profile, ServiceError> {
        let user = current_user(&self.session)?;

        Ok(self
            .profiles
            .get_profile(&user.id)
            .await?
            .unwrap_or_else(|| Profile {
                id: user.id.clone(),
                email: user.email.clone(),
                ..Profile::default()
            }))
    }

    async fn save(&self, mut form: ProfileForm) -> Result<Profile, ServiceError> {
        form.username = validation::username(&form.username)?;
        let user = current_user(&self.session)?;

        let profile = self
            .profiles
            .save_profile(&user.id, &form, self.clock.now())
            .await
            .map_err(ServiceError::from_profile_write)?;
        log::info!("Profile of user {} saved.", user.id);

        Ok(profile)
    }

    async fn upload_avatar(
        &self,
        content_type: &str,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<AvatarUpload, ServiceError> {
        validation::avatar(content_type, bytes.len() as u64, self.max_avatar_bytes)?;
        let user = current_user(&self.session)?;

        let path = format!(
            "{}/{}.{}",
            user.id,
            self.clock.now().timestamp_millis(),
            avatar_extension(file_name, content_type)
        );

        self.storage
            .upload(&self.avatar_bucket, &path, content_type, bytes)
            .await?;
        let public_url = self.storage.public_url(&self.avatar_bucket, &path);

        self.profiles
            .set_avatar_url(&user.id, &public_url, self.clock.now())
            .await?;
        log::info!("Avatar for user {} stored at {}.", user.id, path);

        Ok(AvatarUpload { path, public_url })
    }

    async fn get_wallet(&self) -> Result<WalletForm, ServiceError> {
        let profile = self.get().await?;

        Ok(WalletForm {
            wallet_hash: profile.withdrawal_wallet_hash.unwrap_or_default(),
        })
    }

    async fn save_wallet(&self, form: WalletForm) -> Result<WalletForm, ServiceError> {
        let wallet_hash = validation::wallet(&form.wallet_hash)?;
        let user = current_user(&self.session)?;

        self.profiles
            .set_withdrawal_wallet(&user.id, &wallet_hash, self.clock.now())
            .await?;

        Ok(WalletForm { wallet_hash })
    }

    async fn pin_status(&self) -> Result<PinStatus, ServiceError> {
        let profile = self.get().await?;

        Ok(PinStatus {
            has_pin: profile
                .withdrawal_pin
                .map(|pin| !pin.is_empty())
                .unwrap_or(false),
        })
    }

    async fn save_pin(&self, form: PinForm) -> Result<PinStatus, ServiceError> {
        validation::pin(&form.pin, &form.confirm_pin)?;
        let user = current_user(&self.session)?;

        self.profiles
            .set_withdrawal_pin(&user.id, &form.pin, self.clock.now())
            .await?;
        log::info!("Withdrawal PIN set for user {}.", user.id);

        Ok(PinStatus { has_pin: true })
    }
}

#[async_trait]
impl RequestHandler<ProfileRequest> for ProfileRequestHandler {
    async fn handle_request(&self, request: ProfileRequest) {
        match request {
            ProfileRequest::Get { response } => {
                let _ = response.send(self.get().await);
            }
            ProfileRequest::Save { form, response } => {
                let _ = response.send(self.save(form).await);
            }
            ProfileRequest::UploadAvatar {
                content_type,
                file_name,
                bytes,
                response,
            } => {
                let result = self
                    .upload_avatar(&content_type, file_name.as_deref(), bytes)
                    .await;
                let _ = response.send(result);
            }
            ProfileRequest::GetWallet { response } => {
                let _ = response.send(self.get_wallet().await);
            }
            ProfileRequest::SaveWallet { form, response } => {
                let _ = response.send(self.save_wallet(form).await);
            }
            ProfileRequest::PinStatus { response } => {
                let _ = response.send(self.pin_status().await);
            }
            ProfileRequest::SavePin { form, response } => {
                let _ = response.send(self.save_pin(form).await);
            }
        }
    }
}

pub struct ProfileService;

impl ProfileService {
    pub fn new() -> Self {
        ProfileService {}
    }
}

#[async_trait]
impl Service<ProfileRequest, ProfileRequestHandler> for ProfileService {}
