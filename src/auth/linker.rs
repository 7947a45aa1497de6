use anyhow::anyhow;
use tracing::{info, warn};

use super::password;
use super::providers::{Provider, SocialProfile};
use crate::error::AppError;
use crate::store::{NewUser, StoreError, UserStore};
use crate::users::model::User;

/// Email used for lookup and storage. Providers that withhold the address
/// get a placeholder deterministic in the provider id, so the unique-email
/// invariant holds for every account.
fn effective_email(provider: Provider, profile: &SocialProfile) -> String {
    match profile.email.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() => e.to_lowercase(),
        _ => format!("{}_{}@example.com", provider, profile.provider_user_id),
    }
}

fn default_display_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

async fn create_social_user(
    store: &dyn UserStore,
    provider: Provider,
    profile: &SocialProfile,
    email: &str,
) -> Result<User, StoreError> {
    // The random secret is hashed and discarded; social accounts can only
    // ever log in through their provider.
    let password_hash =
        password::hash_password(&password::random_password()).map_err(StoreError::Backend)?;
    store
        .insert(NewUser {
            display_name: profile
                .display_name
                .clone()
                .unwrap_or_else(|| default_display_name(email)),
            email: email.to_string(),
            password_hash,
            photo_url: profile.photo_url.clone(),
            is_admin: false,
            provider_link: Some((provider, profile.provider_user_id.clone())),
        })
        .await
}

/// Resolves a third-party profile to exactly one local user.
///
/// Lookup is an OR-match on email and provider id: either signal alone
/// proves "this is the same person" once established. A record matched by
/// email that has never seen this provider gets the id backfilled in
/// place; a record already linked to the same id is returned without any
/// write. Two concurrent first logins for the same new user are serialized
/// by the unique email index: the loser observes `DuplicateEmail` and
/// resolves to the winner's record.
pub async fn link_or_create(
    store: &dyn UserStore,
    provider: Provider,
    profile: &SocialProfile,
) -> Result<User, AppError> {
    if profile.provider_user_id.trim().is_empty() {
        warn!(provider = %provider, "provider profile carried no user id");
        return Err(AppError::ProviderProfileInvalid);
    }
    let email = effective_email(provider, profile);

    let existing = match store.find_by_email(&email).await? {
        Some(user) => Some(user),
        None => {
            store
                .find_by_provider_id(provider, &profile.provider_user_id)
                .await?
        }
    };

    let user = match existing {
        None => match create_social_user(store, provider, profile, &email).await {
            Ok(user) => {
                info!(user_id = %user.id, provider = %provider, "social user created");
                user
            }
            Err(StoreError::DuplicateEmail) => store
                .find_by_email(&email)
                .await?
                .ok_or_else(|| AppError::Internal(anyhow!("create lost race but winner missing")))?,
            Err(e) => return Err(e.into()),
        },
        Some(user) => {
            let linked = user.provider_id(provider).map(str::to_string);
            match linked {
                None => {
                    store
                        .set_provider_id(user.id, provider, &profile.provider_user_id)
                        .await?;
                    info!(user_id = %user.id, provider = %provider, "provider id backfilled");
                    store.find_by_id(user.id).await?.ok_or_else(|| {
                        AppError::Internal(anyhow!("user vanished during backfill"))
                    })?
                }
                Some(ref id) if *id == profile.provider_user_id => user,
                Some(_) => {
                    warn!(user_id = %user.id, provider = %provider, "provider id collision");
                    return Err(AppError::Conflict(format!(
                        "{provider} account is already linked to a different user"
                    )));
                }
            }
        }
    };
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;

    fn profile(id: &str, email: Option<&str>) -> SocialProfile {
        SocialProfile {
            provider_user_id: id.into(),
            email: email.map(String::from),
            display_name: Some("Ann".into()),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn first_login_creates_a_linked_user() {
        let store = MemoryUserStore::new();
        let user = link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
            .await
            .unwrap();
        assert_eq!(user.email, "ann@x.com");
        assert_eq!(user.provider_id(Provider::Google), Some("g-1"));
        assert!(!user.is_admin);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn linking_is_idempotent_and_write_free() {
        let store = MemoryUserStore::new();
        let p = profile("g-1", Some("ann@x.com"));
        let first = link_or_create(&store, Provider::Google, &p).await.unwrap();
        let writes_after_create = store.write_count();
        let second = link_or_create(&store, Provider::Google, &p).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.write_count(), writes_after_create);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn provider_id_backfills_onto_email_match() {
        let store = MemoryUserStore::new();
        let local = store
            .insert(NewUser {
                display_name: "Ann Local".into(),
                email: "ann@x.com".into(),
                password_hash: "hash".into(),
                photo_url: None,
                is_admin: true,
                provider_link: None,
            })
            .await
            .unwrap();

        let linked = link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
            .await
            .unwrap();
        assert_eq!(linked.id, local.id);
        assert_eq!(linked.provider_id(Provider::Google), Some("g-1"));
        // Backfill touches nothing else.
        assert_eq!(linked.display_name, "Ann Local");
        assert!(linked.is_admin);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn provider_id_alone_matches_even_when_email_changed() {
        let store = MemoryUserStore::new();
        let first = link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
            .await
            .unwrap();
        // Same Google account, new email at the provider.
        let second = link_or_create(&store, Provider::Google, &profile("g-1", Some("new@x.com")))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_email_synthesizes_placeholder() {
        let store = MemoryUserStore::new();
        let user = link_or_create(&store, Provider::Kakao, &profile("123", Some("")))
            .await
            .unwrap();
        assert_eq!(user.email, "kakao_123@example.com");
        assert_eq!(user.provider_id(Provider::Kakao), Some("123"));
    }

    #[tokio::test]
    async fn empty_provider_id_is_rejected() {
        let store = MemoryUserStore::new();
        let err = link_or_create(&store, Provider::Line, &profile("", Some("ann@x.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProviderProfileInvalid));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn same_email_different_provider_id_is_a_conflict() {
        let store = MemoryUserStore::new();
        link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
            .await
            .unwrap();
        let err = link_or_create(&store, Provider::Google, &profile("g-2", Some("ann@x.com")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn same_email_through_second_provider_links_both() {
        let store = MemoryUserStore::new();
        let via_google =
            link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
                .await
                .unwrap();
        let via_kakao = link_or_create(&store, Provider::Kakao, &profile("k-1", Some("ann@x.com")))
            .await
            .unwrap();
        assert_eq!(via_google.id, via_kakao.id);
        assert_eq!(via_kakao.provider_id(Provider::Google), Some("g-1"));
        assert_eq!(via_kakao.provider_id(Provider::Kakao), Some("k-1"));
    }

    /// Store wrapper reproducing the lost find-or-create race: lookups see
    /// a stale "no user" snapshot while the insert hits the unique index.
    struct RacingStore {
        inner: MemoryUserStore,
        blind_lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl UserStore for RacingStore {
        async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
            self.inner.insert(user).await
        }
        async fn find_by_id(&self, id: uuid::Uuid) -> Result<Option<User>, StoreError> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            if self
                .blind_lookups
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| n.checked_sub(1),
                )
                .is_ok()
            {
                return Ok(None);
            }
            self.inner.find_by_email(email).await
        }
        async fn find_by_provider_id(
            &self,
            provider: Provider,
            subject: &str,
        ) -> Result<Option<User>, StoreError> {
            if self
                .blind_lookups
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| n.checked_sub(1),
                )
                .is_ok()
            {
                return Ok(None);
            }
            self.inner.find_by_provider_id(provider, subject).await
        }
        async fn list(&self) -> Result<Vec<User>, StoreError> {
            self.inner.list().await
        }
        async fn set_provider_id(
            &self,
            id: uuid::Uuid,
            provider: Provider,
            subject: &str,
        ) -> Result<(), StoreError> {
            self.inner.set_provider_id(id, provider, subject).await
        }
        async fn touch_last_login(&self, id: uuid::Uuid) -> Result<User, StoreError> {
            self.inner.touch_last_login(id).await
        }
        async fn update(
            &self,
            id: uuid::Uuid,
            changes: crate::store::UserChanges,
        ) -> Result<User, StoreError> {
            self.inner.update(id, changes).await
        }
        async fn delete(&self, id: uuid::Uuid) -> Result<(), StoreError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn lost_create_race_resolves_to_the_winner() {
        let store = RacingStore {
            inner: MemoryUserStore::new(),
            blind_lookups: std::sync::atomic::AtomicUsize::new(2),
        };
        // The winner committed before our (stale) lookups ran.
        let winner = link_or_create(
            &store.inner,
            Provider::Google,
            &profile("g-1", Some("ann@x.com")),
        )
        .await
        .unwrap();

        // Both lookups miss, the insert loses to the unique index, and the
        // linker re-reads instead of surfacing an error.
        let resolved = link_or_create(&store, Provider::Google, &profile("g-1", Some("ann@x.com")))
            .await
            .unwrap();
        assert_eq!(resolved.id, winner.id);
        assert_eq!(store.inner.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_logins_resolve_to_one_record() {
        let store = std::sync::Arc::new(MemoryUserStore::new());
        let p = profile("g-1", Some("ann@x.com"));
        let (a, b) = tokio::join!(
            link_or_create(store.as_ref(), Provider::Google, &p),
            link_or_create(store.as_ref(), Provider::Google, &p),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.len(), 1);
    }
}
