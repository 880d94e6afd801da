//! Command implementations
//!
//! 각 명령은 `App` 하나를 공유합니다: 설정, 스토리지, 엔진, protection facade.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, error, info};
use warden_core::{ContextProviderRegistry, EntityProtection, PrivilegeEngine, RepairJob, RepairReport};
use warden_foundation::{
    EngineConfig, EntityKind, EntityQuery, EntityRef, PrivilegeRecord, PrivilegeValue, Privileges,
    ResolvedPrivilege, Storage, Tier, User, UserId,
};

pub struct App {
    config: EngineConfig,
    storage: Arc<Storage>,
    engine: Arc<PrivilegeEngine>,
    protection: EntityProtection,
}

impl App {
    /// Load the config, open the database and wire the engine.
    pub fn open(config_path: Option<&Path>, db_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => EngineConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EngineConfig::load().context("Failed to load config")?,
        };
        if let Some(db) = db_override {
            config = config.db_path_override(db);
        }

        let db_path = config.db_path();
        debug!("Opening database at {}", db_path.display());
        let storage = Arc::new(
            Storage::open(&db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?,
        );

        let registry = Arc::new(ContextProviderRegistry::with_builtins());
        let engine = Arc::new(PrivilegeEngine::with_config(storage.clone(), registry, &config));
        let protection = EntityProtection::new(engine.clone());

        Ok(Self {
            config,
            storage,
            engine,
            protection,
        })
    }

    fn user(&self, id: &str) -> anyhow::Result<User> {
        self.storage
            .get_user(&UserId::new(id))?
            .with_context(|| format!("Unknown user: {}", id))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Prints `allow` / `deny`; exit code 1 when denied.
    pub fn check(&self, user: &str, kind: EntityKind, id: &str, tier: Tier) -> anyhow::Result<ExitCode> {
        let user = self.user(user)?;
        let entity = EntityRef::new(kind, id);

        if self.engine.is_allowed(&user, &entity, tier)? {
            println!("allow");
            Ok(ExitCode::SUCCESS)
        } else {
            println!("deny");
            Ok(ExitCode::from(1))
        }
    }

    pub fn list(
        &self,
        user: &str,
        kind: EntityKind,
        tier: Tier,
        include_trashed: bool,
        limit: Option<u32>,
    ) -> anyhow::Result<ExitCode> {
        let user = self.user(user)?;

        let mut query = EntityQuery::new(kind);
        if !include_trashed {
            query = query.active();
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let query = self.engine.filter_visible(&user, tier, query)?;
        let entities = self.storage.query_entities(&query)?;

        if entities.is_empty() {
            println!("No {} entities with {} for {}.", kind, tier, user.username);
            return Ok(ExitCode::SUCCESS);
        }

        println!("{:<38} {:<30} {:<8} {:<38}", "ID", "Title", "State", "Project");
        println!("{}", "-".repeat(116));
        for entity in entities {
            let title = if entity.title.chars().count() > 28 {
                format!("{}...", entity.title.chars().take(25).collect::<String>())
            } else {
                entity.title.clone()
            };
            let state = if entity.is_trashed() { "trashed" } else { "active" };
            let project = entity
                .project_id
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{:<38} {:<30} {:<8} {:<38}", entity.id.as_str(), title, state, project);
        }
        Ok(ExitCode::SUCCESS)
    }

    /// Merged privileges as JSON.
    pub fn privileges(&self, kind: EntityKind, id: &str, actor: Option<&str>) -> anyhow::Result<ExitCode> {
        let entity = EntityRef::new(kind, id);
        let entries: Vec<ResolvedPrivilege> = match actor {
            Some(actor) => {
                let actor = self.user(actor)?;
                self.protection.privileges(&actor, &entity)?
            }
            None => self.engine.privileges_for(&entity)?,
        };

        println!("{}", serde_json::to_string_pretty(&entries)?);
        Ok(ExitCode::SUCCESS)
    }

    // ========================================================================
    // Grant management
    // ========================================================================

    pub fn grant(
        &self,
        actor: &str,
        user: &str,
        kind: EntityKind,
        id: &str,
        values: &[(Tier, Option<PrivilegeValue>)],
    ) -> anyhow::Result<ExitCode> {
        let actor = self.user(actor)?;
        let target = self.user(user)?;

        let privileges = values
            .iter()
            .filter_map(|(tier, value)| value.map(|value| (*tier, value)))
            .fold(Privileges::neutral(), |acc, (tier, value)| acc.with(tier, value));
        if privileges.is_neutral() {
            bail!("Nothing to grant: pass at least one of --full-access, --view, --edit, --trash, --restore");
        }

        let record = PrivilegeRecord::new(target.id.clone(), EntityRef::new(kind, id), privileges);
        let stored = self.protection.grant(&actor, record)?;

        println!("{}", serde_json::to_string_pretty(&stored)?);
        Ok(ExitCode::SUCCESS)
    }

    pub fn revoke(&self, actor: &str, user: &str, kind: EntityKind, id: &str) -> anyhow::Result<ExitCode> {
        let actor = self.user(actor)?;
        let entity = EntityRef::new(kind, id);

        if self.protection.revoke(&actor, &UserId::new(user), &entity)? {
            println!("Revoked privileges of {} on {}", user, entity);
        } else {
            println!("{} had no direct privileges on {}", user, entity);
        }
        Ok(ExitCode::SUCCESS)
    }

    // ========================================================================
    // Repair
    // ========================================================================

    pub fn repair_once(&self) -> anyhow::Result<ExitCode> {
        let report = RepairJob::new(self.storage.clone()).run()?;
        print_report(&report)?;
        Ok(ExitCode::SUCCESS)
    }

    /// Run the sweep on an interval until Ctrl-C.
    pub async fn repair_watch(&self, interval: Option<u64>) -> anyhow::Result<ExitCode> {
        if !self.config.repair.enabled {
            info!("Repair is disabled in the config (repair.enabled = false)");
            return Ok(ExitCode::SUCCESS);
        }

        let secs = interval.unwrap_or(self.config.repair.interval_secs);
        if secs == 0 {
            bail!("--interval must be at least 1 second");
        }
        info!("Running repair sweep every {}s, Ctrl-C to stop", secs);

        let job = RepairJob::new(self.storage.clone());
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let job = job.clone();
                    match tokio::task::spawn_blocking(move || job.run()).await? {
                        Ok(report) => print_report(&report)?,
                        Err(e) => error!("Repair sweep failed: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Stopping repair sweep");
                    break;
                }
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_report(report: &RepairReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}
