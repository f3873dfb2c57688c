//! # KoiHire Seeder
//!
//! Loads demo data into a development database: an admin, a client with an
//! open project and a freelancer with a three-tier service. Accounts that
//! already exist are left alone, so the tool can be rerun.
//!
//! All seeded accounts share `SEED_PASSWORD` (default `koihire-demo-pass`).

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::info;

use koihire::application::services::auth_service::hash_password;
use koihire::application::services::{
    AuthService, CatalogService, NewProject, NewService, ProjectService, RegisterInput,
    UserService,
};
use koihire::application::Actor;
use koihire::config::Settings;
use koihire::domain::{
    BudgetType, PackageTier, ProfileUpdate, ServicePackage, User, UserRepository, UserRole,
};
use koihire::infrastructure::database;
use koihire::infrastructure::payments::ManualProvider;
use koihire::infrastructure::repositories::PgUserRepository;
use koihire::startup::AppState;

const DEFAULT_PASSWORD: &str = "koihire-demo-pass";

#[tokio::main]
async fn main() -> Result<()> {
    koihire::telemetry::init_tracing();

    let settings = Settings::load()?;
    let password = std::env::var("SEED_PASSWORD").unwrap_or_else(|_| DEFAULT_PASSWORD.into());

    let db = database::create_pool(&settings.database).await?;
    database::run_migrations(&db).await?;

    let state = AppState::new(settings, db, None, Arc::new(ManualProvider));

    let admin = seed_admin(&state, &password).await?;
    info!(user_id = admin.id, "Admin ready");

    let client = seed_user(&state, "client@koihire.dev", "demo_client", UserRole::Client, &password)
        .await?;
    let freelancer = seed_user(
        &state,
        "freelancer@koihire.dev",
        "demo_freelancer",
        UserRole::Freelancer,
        &password,
    )
    .await?;

    let Some(client) = client else {
        info!("Demo accounts already exist; nothing else to seed");
        return Ok(());
    };

    let project = state
        .project_service()
        .create_project(
            Actor::new(client.id, client.role),
            NewProject {
                title: "Landing page for a koi pond supplier".into(),
                description: "Responsive marketing site with a product catalogue and a contact form."
                    .into(),
                category: "web-development".into(),
                skills: vec!["rust".into(), "html".into(), "css".into()],
                budget_type: BudgetType::Fixed,
                budget_min_cents: 50_000,
                budget_max_cents: 120_000,
                deadline: Some(Utc::now() + Duration::days(30)),
            },
        )
        .await
        .context("creating demo project")?;
    info!(project_id = project.id, "Demo project created");

    if let Some(freelancer) = freelancer {
        state
            .user_service()
            .update_profile(
                freelancer.id,
                ProfileUpdate {
                    bio: Some("Backend developer focused on Rust web services.".into()),
                    skills: Some(vec!["rust".into(), "postgresql".into(), "axum".into()]),
                    hourly_rate_cents: Some(8_500),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .context("updating freelancer profile")?;

        let service = state
            .catalog_service()
            .create_service(
                Actor::new(freelancer.id, freelancer.role),
                NewService {
                    title: "REST API in Rust".into(),
                    description: "A documented axum + PostgreSQL API built to your requirements.".into(),
                    category: "web-development".into(),
                    tags: vec!["rust".into(), "api".into()],
                    packages: demo_packages(),
                },
            )
            .await
            .context("creating demo service")?;
        info!(service_id = service.id, "Demo service created");
    }

    info!("Seeding complete");
    Ok(())
}

/// Admins cannot self-register, so the account is written directly.
async fn seed_admin(state: &AppState, password: &str) -> Result<User> {
    let repo = PgUserRepository::new(state.db.clone());
    let email = "admin@koihire.dev";
    if let Some(existing) = repo.find_by_email(email).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let admin = User {
        id: state.snowflake.generate(),
        email: email.into(),
        username: "admin".into(),
        password_hash: hash_password(password)?,
        display_name: Some("KoiHire Admin".into()),
        role: UserRole::Admin,
        created_at: now,
        updated_at: now,
        ..User::default()
    };
    Ok(repo.create(&admin).await?)
}

/// `None` when the account already exists.
async fn seed_user(
    state: &AppState,
    email: &str,
    username: &str,
    role: UserRole,
    password: &str,
) -> Result<Option<User>> {
    let repo = PgUserRepository::new(state.db.clone());
    if repo.email_exists(email).await? {
        info!(email, "Account exists, skipping");
        return Ok(None);
    }

    let (user, _) = state
        .auth_service()
        .register(RegisterInput {
            email: email.into(),
            username: username.into(),
            password: password.into(),
            role,
            display_name: None,
        })
        .await?;
    info!(user_id = user.id, role = %user.role, "Account created");
    Ok(Some(user))
}

fn demo_packages() -> Vec<ServicePackage> {
    [
        (PackageTier::Basic, "Single endpoint", 15_000, 3, 1),
        (PackageTier::Standard, "CRUD resource", 45_000, 7, 2),
        (PackageTier::Premium, "Full service", 120_000, 21, 5),
    ]
    .into_iter()
    .map(|(tier, title, price_cents, delivery_days, revisions)| ServicePackage {
        tier,
        title: title.into(),
        description: format!("{} with tests and OpenAPI notes", title),
        price_cents,
        delivery_days,
        revisions,
        features: vec!["Source code".into(), "Deployment guide".into()],
    })
    .collect()
}
