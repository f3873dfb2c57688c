//! Service listing ("gig") with tiered packages, and repository trait.
//!
//! Maps to the `services` and `service_packages` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Cents, ListingTier};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

string_enum! {
    pub enum PackageTier {
        Basic => "basic",
        Standard => "standard",
        Premium => "premium",
    }
}

impl PackageTier {
    fn order(&self) -> u8 {
        match self {
            PackageTier::Basic => 0,
            PackageTier::Standard => 1,
            PackageTier::Premium => 2,
        }
    }
}

/// One purchasable tier of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePackage {
    pub tier: PackageTier,
    pub title: String,
    pub description: String,
    pub price_cents: Cents,
    pub delivery_days: i32,
    pub revisions: i32,
    pub features: Vec<String>,
}

/// Reasons a package set is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageRuleViolation {
    #[error("a BASIC package is required")]
    MissingBasic,

    #[error("duplicate {0} package")]
    DuplicateTier(PackageTier),

    #[error("{0} package must have a positive price and delivery time")]
    NonPositive(PackageTier),

    #[error("{0} package revisions cannot be negative")]
    NegativeRevisions(PackageTier),

    #[error("{higher} package cannot be cheaper than {lower}")]
    PriceOrder {
        lower: PackageTier,
        higher: PackageTier,
    },
}

/// Check the package rules and return the packages sorted by tier.
pub fn validate_packages(
    packages: &[ServicePackage],
) -> Result<Vec<ServicePackage>, PackageRuleViolation> {
    let mut sorted = packages.to_vec();
    sorted.sort_by_key(|p| p.tier.order());

    for pair in sorted.windows(2) {
        if pair[0].tier == pair[1].tier {
            return Err(PackageRuleViolation::DuplicateTier(pair[0].tier));
        }
    }
    if sorted.first().map(|p| p.tier) != Some(PackageTier::Basic) {
        return Err(PackageRuleViolation::MissingBasic);
    }
    for package in &sorted {
        if package.price_cents <= 0 || package.delivery_days <= 0 {
            return Err(PackageRuleViolation::NonPositive(package.tier));
        }
        if package.revisions < 0 {
            return Err(PackageRuleViolation::NegativeRevisions(package.tier));
        }
    }
    for pair in sorted.windows(2) {
        if pair[1].price_cents < pair[0].price_cents {
            return Err(PackageRuleViolation::PriceOrder {
                lower: pair[0].tier,
                higher: pair[1].tier,
            });
        }
    }

    Ok(sorted)
}

/// A freelancer's packaged service offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceListing {
    pub id: i64,
    pub freelancer_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub tier: ListingTier,
    /// Sorted BASIC, STANDARD, PREMIUM
    pub packages: Vec<ServicePackage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceListing {
    pub fn package(&self, tier: PackageTier) -> Option<&ServicePackage> {
        self.packages.iter().find(|p| p.tier == tier)
    }

    /// Lowest package price, used for "starting at" display and price filters.
    pub fn starting_price(&self) -> Option<Cents> {
        self.packages.iter().map(|p| p.price_cents).min()
    }
}

impl Default for ServiceListing {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            freelancer_id: 0,
            title: String::new(),
            description: String::new(),
            category: String::new(),
            tags: Vec::new(),
            is_active: true,
            tier: ListingTier::Standard,
            packages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Browse filter for services.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceFilter {
    pub category: Option<String>,
    pub query: Option<String>,
    pub freelancer_id: Option<i64>,
    pub max_price_cents: Option<Cents>,
    /// Owners and admins see their inactive listings
    pub include_inactive: bool,
}

/// Repository trait for service listings and their packages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    /// Load a listing with its packages.
    async fn find_by_id(&self, id: i64) -> Result<Option<ServiceListing>, AppError>;

    /// Insert the listing and its packages in one transaction.
    async fn create(&self, service: &ServiceListing) -> Result<ServiceListing, AppError>;

    /// Persist title, description, category and tags.
    async fn update_details(&self, service: &ServiceListing) -> Result<ServiceListing, AppError>;

    /// Replace every package of a listing in one transaction.
    async fn replace_packages(
        &self,
        service_id: i64,
        packages: &[ServicePackage],
    ) -> Result<ServiceListing, AppError>;

    async fn search(
        &self,
        filter: &ServiceFilter,
        page: PageRequest,
    ) -> Result<(Vec<ServiceListing>, i64), AppError>;

    async fn set_active(&self, id: i64, active: bool) -> Result<Option<ServiceListing>, AppError>;

    async fn set_tier(&self, id: i64, tier: ListingTier)
        -> Result<Option<ServiceListing>, AppError>;

    async fn count_active(&self) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn package(tier: PackageTier, price: Cents) -> ServicePackage {
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

    #[test]
    fn test_valid_packages_are_sorted() {
        let sorted = validate_packages(&[
            package(PackageTier::Premium, 9000),
            package(PackageTier::Basic, 3000),
            package(PackageTier::Standard, 5000),
        ])
        .unwrap();
        let tiers: Vec<_> = sorted.iter().map(|p| p.tier).collect();
        assert_eq!(
            tiers,
            vec![PackageTier::Basic, PackageTier::Standard, PackageTier::Premium]
        );
    }

    #[test]
    fn test_basic_required() {
        assert_eq!(
            validate_packages(&[package(PackageTier::Standard, 5000)]),
            Err(PackageRuleViolation::MissingBasic)
        );
        assert_eq!(validate_packages(&[]), Err(PackageRuleViolation::MissingBasic));
    }

    #[test]
    fn test_duplicate_tier() {
        assert_eq!(
            validate_packages(&[
                package(PackageTier::Basic, 1000),
                package(PackageTier::Basic, 2000)
            ]),
            Err(PackageRuleViolation::DuplicateTier(PackageTier::Basic))
        );
    }

    #[test]
    fn test_price_order() {
        assert_eq!(
            validate_packages(&[
                package(PackageTier::Basic, 5000),
                package(PackageTier::Standard, 4000)
            ]),
            Err(PackageRuleViolation::PriceOrder {
                lower: PackageTier::Basic,
                higher: PackageTier::Standard
            })
        );
    }

    #[test]
    fn test_non_positive_price() {
        assert_eq!(
            validate_packages(&[package(PackageTier::Basic, 0)]),
            Err(PackageRuleViolation::NonPositive(PackageTier::Basic))
        );
    }
}
