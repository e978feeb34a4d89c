use super::IProfileRepo;
use crate::repos::shared::inmemory_repo::*;
use smart_notifier_domain::{Profile, ID};

#[derive(Debug, Clone)]
pub struct DeviceInstall {
    pub user_id: ID,
    pub platform: String,
    pub last_seen_at: i64,
}

pub struct InMemoryProfileRepo {
    profiles: std::sync::Mutex<Vec<Profile>>,
    installs: std::sync::Mutex<Vec<DeviceInstall>>,
}

impl InMemoryProfileRepo {
    pub fn new() -> Self {
        Self {
            profiles: std::sync::Mutex::new(Vec::new()),
            installs: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, profile: &Profile) {
        insert(profile, &self.profiles);
    }

    pub fn update(&self, profile: &Profile) {
        save(profile, &self.profiles);
    }

    pub fn insert_install(&self, install: &DeviceInstall) {
        insert(install, &self.installs);
    }
}

#[async_trait::async_trait]
impl IProfileRepo for InMemoryProfileRepo {
    async fn find_many(&self, user_ids: &[ID]) -> anyhow::Result<Vec<Profile>> {
        Ok(find_by(&self.profiles, |profile: &Profile| {
            user_ids.contains(&profile.user_id)
        }))
    }

    async fn find_recent_android_users(
        &self,
        user_ids: &[ID],
        last_seen_after: i64,
    ) -> anyhow::Result<Vec<ID>> {
        let mut users = find_by(&self.installs, |install: &DeviceInstall| {
            install.platform == "android"
                && user_ids.contains(&install.user_id)
                && install.last_seen_at >= last_seen_after
        })
        .into_iter()
        .map(|install| install.user_id)
        .collect::<Vec<_>>();
        users.dedup();
        Ok(users)
    }
}
