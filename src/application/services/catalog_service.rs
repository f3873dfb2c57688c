//! Catalog Service
//!
//! Freelancer service listings and their BASIC/STANDARD/PREMIUM packages.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::application::services::user_service::normalize_skills;
use crate::application::Actor;
use crate::domain::{
    validate_packages, ListingTier, PackageRuleViolation, ServiceFilter, ServiceListing,
    ServicePackage, ServiceRepository,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::snowflake::SnowflakeGenerator;

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn create_service(
        &self,
        actor: Actor,
        input: NewService,
    ) -> Result<ServiceListing, CatalogError>;

    /// Inactive listings are only visible to their owner and admins.
    async fn get_service(
        &self,
        viewer: Option<Actor>,
        service_id: i64,
    ) -> Result<ServiceListing, CatalogError>;

    async fn browse(
        &self,
        filter: ServiceFilter,
        page: PageRequest,
    ) -> Result<Page<ServiceListing>, CatalogError>;

    async fn my_services(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<ServiceListing>, CatalogError>;

    async fn update_service(
        &self,
        actor: Actor,
        service_id: i64,
        changes: ServiceChanges,
    ) -> Result<ServiceListing, CatalogError>;

    async fn replace_packages(
        &self,
        actor: Actor,
        service_id: i64,
        packages: Vec<ServicePackage>,
    ) -> Result<ServiceListing, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct NewService {
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub packages: Vec<ServicePackage>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Service not found")]
    NotFound,

    #[error("Only freelancers can sell services")]
    FreelancersOnly,

    #[error("Only the service owner can do this")]
    NotOwner,

    #[error(transparent)]
    Packages(#[from] PackageRuleViolation),

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => AppError::NotFound(err.to_string()),
            CatalogError::FreelancersOnly | CatalogError::NotOwner => {
                AppError::Forbidden(err.to_string())
            }
            CatalogError::Packages(_) => AppError::Validation(err.to_string()),
            CatalogError::Internal(inner) => inner,
        }
    }
}

pub struct CatalogServiceImpl<S>
where
    S: ServiceRepository,
{
    service_repo: Arc<S>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<S> CatalogServiceImpl<S>
where
    S: ServiceRepository,
{
    pub fn new(service_repo: Arc<S>, id_generator: Arc<SnowflakeGenerator>) -> Self {
        Self {
            service_repo,
            id_generator,
        }
    }

    async fn load_owned(&self, actor: Actor, service_id: i64) -> Result<ServiceListing, CatalogError> {
        let service = self
            .service_repo
            .find_by_id(service_id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        if service.freelancer_id != actor.user_id {
            return Err(CatalogError::NotOwner);
        }
        Ok(service)
    }
}

#[async_trait]
impl<S> CatalogService for CatalogServiceImpl<S>
where
    S: ServiceRepository + 'static,
{
    async fn create_service(
        &self,
        actor: Actor,
        input: NewService,
    ) -> Result<ServiceListing, CatalogError> {
        if !actor.is_freelancer() {
            return Err(CatalogError::FreelancersOnly);
        }
        let packages = validate_packages(&input.packages)?;

        let mut tags = input.tags;
        normalize_skills(&mut tags);

        let now = Utc::now();
        let service = ServiceListing {
            id: self.id_generator.generate(),
            freelancer_id: actor.user_id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category.trim().to_lowercase(),
            tags,
            is_active: true,
            tier: ListingTier::Standard,
            packages,
            created_at: now,
            updated_at: now,
        };

        let created = self.service_repo.create(&service).await?;
        tracing::info!(service_id = created.id, freelancer_id = actor.user_id, "Service listed");
        Ok(created)
    }

    async fn get_service(
        &self,
        viewer: Option<Actor>,
        service_id: i64,
    ) -> Result<ServiceListing, CatalogError> {
        let service = self
            .service_repo
            .find_by_id(service_id)
            .await?
            .ok_or(CatalogError::NotFound)?;
        let privileged =
            viewer.is_some_and(|v| v.is_admin() || v.user_id == service.freelancer_id);
        if !service.is_active && !privileged {
            return Err(CatalogError::NotFound);
        }
        Ok(service)
    }

    async fn browse(
        &self,
        mut filter: ServiceFilter,
        page: PageRequest,
    ) -> Result<Page<ServiceListing>, CatalogError> {
        filter.include_inactive = false;
        let (items, total) = self.service_repo.search(&filter, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn my_services(
        &self,
        actor: Actor,
        page: PageRequest,
    ) -> Result<Page<ServiceListing>, CatalogError> {
        let filter = ServiceFilter {
            freelancer_id: Some(actor.user_id),
            include_inactive: true,
            ..ServiceFilter::default()
        };
        let (items, total) = self.service_repo.search(&filter, page).await?;
        Ok(Page::new(items, page, total))
    }

    async fn update_service(
        &self,
        actor: Actor,
        service_id: i64,
        changes: ServiceChanges,
    ) -> Result<ServiceListing, CatalogError> {
        let mut service = self.load_owned(actor, service_id).await?;
        if let Some(title) = changes.title {
            service.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            service.description = description;
        }
        if let Some(category) = changes.category {
            service.category = category.trim().to_lowercase();
        }
        if let Some(mut tags) = changes.tags {
            normalize_skills(&mut tags);
            service.tags = tags;
        }
        Ok(self.service_repo.update_details(&service).await?)
    }

    async fn replace_packages(
        &self,
        actor: Actor,
        service_id: i64,
        packages: Vec<ServicePackage>,
    ) -> Result<ServiceListing, CatalogError> {
        self.load_owned(actor, service_id).await?;
        let packages = validate_packages(&packages)?;
        Ok(self
            .service_repo
            .replace_packages(service_id, &packages)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockServiceRepository, PackageTier, UserRole};

    const SELLER: i64 = 3;

    fn package(tier: PackageTier, price: i64) -> ServicePackage {
        ServicePackage {
            tier,
            title: tier.to_string(),
            description: String::new(),
            price_cents: price,
            delivery_days: 3,
            revisions: 1,
            features: vec![],
        }
    }

    fn listing(active: bool) -> ServiceListing {
        ServiceListing {
            id: 8,
            freelancer_id: SELLER,
            title: "Logo design".into(),
            description: String::new(),
            category: "design".into(),
            tags: vec![],
            is_active: active,
            tier: ListingTier::Standard,
            packages: vec![package(PackageTier::Basic, 5000)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(repo: MockServiceRepository) -> CatalogServiceImpl<MockServiceRepository> {
        CatalogServiceImpl::new(Arc::new(repo), Arc::new(SnowflakeGenerator::new(1, 1)))
    }

    #[tokio::test]
    async fn test_create_sorts_packages() {
        let mut repo = MockServiceRepository::new();
        repo.expect_create().returning(|s| Ok(s.clone()));
        let svc = service(repo);

        let created = svc
            .create_service(
                Actor::new(SELLER, UserRole::Freelancer),
                NewService {
                    title: "Logo".into(),
                    description: "Vector logo".into(),
                    category: "Design".into(),
                    tags: vec!["Logo".into()],
                    packages: vec![
                        package(PackageTier::Premium, 9000),
                        package(PackageTier::Basic, 3000),
                    ],
                },
            )
            .await
            .unwrap();
        let tiers: Vec<_> = created.packages.iter().map(|p| p.tier).collect();
        assert_eq!(tiers, vec![PackageTier::Basic, PackageTier::Premium]);
        assert!(created.is_active);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_packages() {
        let svc = service(MockServiceRepository::new());
        let err = svc
            .create_service(
                Actor::new(SELLER, UserRole::Freelancer),
                NewService {
                    title: "Logo".into(),
                    description: String::new(),
                    category: "design".into(),
                    tags: vec![],
                    packages: vec![package(PackageTier::Standard, 3000)],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Packages(PackageRuleViolation::MissingBasic)
        ));
    }

    #[tokio::test]
    async fn test_inactive_hidden_from_public() {
        let mut repo = MockServiceRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(Some(listing(false))));
        let svc = service(repo);

        assert!(matches!(
            svc.get_service(None, 8).await,
            Err(CatalogError::NotFound)
        ));
        assert!(svc
            .get_service(Some(Actor::new(SELLER, UserRole::Freelancer)), 8)
            .await
            .is_ok());
        assert!(svc
            .get_service(Some(Actor::new(1, UserRole::Admin)), 8)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_only_owner_replaces_packages() {
        let mut repo = MockServiceRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(Some(listing(true))));
        let svc = service(repo);
        let err = svc
            .replace_packages(
                Actor::new(99, UserRole::Freelancer),
                8,
                vec![package(PackageTier::Basic, 1000)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotOwner));
    }
}
