use crate::core::{ensure_unique_versions, Migration, MigrationReport};
use crate::error::Error;
use crate::finder::MigrationFinder;
use crate::runner::{Runner, RunnerFactory};
use std::collections::{HashMap, HashSet};

type StartCallback = Box<dyn Fn(i64, &str) + Send + Sync>;
type CompleteCallback = Box<dyn Fn() + Send + Sync>;

/// The entrypoint for applying and reverting migrations.
///
/// Each [MigrationService::up] or [MigrationService::down] call discovers migrations
/// afresh through its [MigrationFinder], opens one runner (one transaction) from its
/// [RunnerFactory], and commits only when every targeted migration succeeded.
pub struct MigrationService<F, R> {
    finder: F,
    runner_factory: R,
    on_migration_start: Option<StartCallback>,
    on_migration_complete: Option<CompleteCallback>,
}

// Manual Debug impl since closures don't implement Debug
impl<F: std::fmt::Debug, R: std::fmt::Debug> std::fmt::Debug for MigrationService<F, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationService")
            .field("finder", &self.finder)
            .field("runner_factory", &self.runner_factory)
            .field("on_migration_start", &self.on_migration_start.is_some())
            .field(
                "on_migration_complete",
                &self.on_migration_complete.is_some(),
            )
            .finish()
    }
}

impl<F: MigrationFinder, R: RunnerFactory> MigrationService<F, R> {
    pub fn new(finder: F, runner_factory: R) -> Self {
        Self {
            finder,
            runner_factory,
            on_migration_start: None,
            on_migration_complete: None,
        }
    }

    /// Set a callback to be invoked right before a migration executes.
    /// The callback receives the migration version and name.
    pub fn on_migration_start<C>(mut self, callback: C) -> Self
    where
        C: Fn(i64, &str) + Send + Sync + 'static,
    {
        self.on_migration_start = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked right after a migration executed successfully.
    pub fn on_migration_complete<C>(mut self, callback: C) -> Self
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.on_migration_complete = Some(Box::new(callback));
        self
    }

    pub fn finder(&self) -> &F {
        &self.finder
    }

    pub fn runner_factory(&self) -> &R {
        &self.runner_factory
    }

    /// Apply every up migration that is not yet recorded in the history table,
    /// in ascending version order, then commit.
    ///
    /// When no up migrations exist at all no runner is created.
    /// If any migration fails the error is returned and nothing is committed.
    pub fn up(&self) -> Result<MigrationReport, Error> {
        let migrations = self.finder.up_migrations()?;
        ensure_unique_versions(&migrations)?;

        if migrations.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("No up migrations found, nothing to do");
            return Ok(MigrationReport::default());
        }

        let mut runner = self.runner_factory.create()?;
        let executed: HashSet<i64> = runner.executed_migrations()?.into_iter().collect();
        let pending = pending_up(&migrations, &executed);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            discovered = migrations.len(),
            executed = executed.len(),
            pending = ?pending.iter().map(|m| m.version()).collect::<Vec<_>>(),
            "Considering migrations to apply"
        );

        let mut migrations_run = Vec::with_capacity(pending.len());
        for migration in pending {
            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "migration_up",
                version = migration.version(),
                name = %migration.name()
            )
            .entered();

            self.notify_start(migration);
            runner.execute_up(migration).map_err(|error| {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %error, "Migration failed");
                error
            })?;
            self.notify_complete();

            migrations_run.push(migration.version());
        }

        runner.commit()?;

        #[cfg(feature = "tracing")]
        tracing::info!(applied = migrations_run.len(), "Migrations committed");

        Ok(MigrationReport { migrations_run })
    }

    /// Revert every executed migration with a version greater than `version`,
    /// newest first, then commit. `0` reverts everything.
    ///
    /// A positive `version` must itself be recorded in the history table.
    /// Each reverted version needs a matching down migration; the call fails
    /// when it reaches a version that has none.
    pub fn down(&self, version: i64) -> Result<MigrationReport, Error> {
        validate_target(version)?;

        let mut runner = self.runner_factory.create()?;
        let plan = self.revert_plan(&mut runner, version)?;
        let mut scripts = plan.scripts;

        let mut migrations_run = Vec::with_capacity(plan.versions.len());
        for target in plan.versions {
            let migration = scripts
                .remove(&target)
                .ok_or(Error::MigrationScriptMissing(target))?;

            #[cfg(feature = "tracing")]
            let _span = tracing::info_span!(
                "migration_down",
                version = migration.version(),
                name = %migration.name()
            )
            .entered();

            self.notify_start(&migration);
            runner.execute_down(&migration).map_err(|error| {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %error, "Migration rollback failed");
                error
            })?;
            self.notify_complete();

            migrations_run.push(target);
        }

        runner.commit()?;

        #[cfg(feature = "tracing")]
        tracing::info!(reverted = migrations_run.len(), "Rollbacks committed");

        Ok(MigrationReport { migrations_run })
    }

    /// The up migrations [MigrationService::up] would apply, in the order it would
    /// apply them. Nothing is executed or committed.
    pub fn preview_up(&self) -> Result<Vec<Migration>, Error> {
        let migrations = self.finder.up_migrations()?;
        ensure_unique_versions(&migrations)?;

        if migrations.is_empty() {
            return Ok(vec![]);
        }

        let executed: HashSet<i64> = self
            .runner_factory
            .create()?
            .executed_migrations()?
            .into_iter()
            .collect();

        let mut pending: Vec<Migration> = migrations
            .into_iter()
            .filter(|m| !executed.contains(&m.version()))
            .collect();
        pending.sort_by_key(|m| m.version());
        Ok(pending)
    }

    /// The down migrations [MigrationService::down] would run for `version`, in the
    /// order it would run them. Fails with the same errors `down` would, before
    /// executing anything.
    pub fn preview_down(&self, version: i64) -> Result<Vec<Migration>, Error> {
        validate_target(version)?;

        let mut runner = self.runner_factory.create()?;
        let plan = self.revert_plan(&mut runner, version)?;
        let mut scripts = plan.scripts;

        plan.versions
            .into_iter()
            .map(|target| {
                scripts
                    .remove(&target)
                    .ok_or(Error::MigrationScriptMissing(target))
            })
            .collect()
    }

    /// The versions recorded in the history table, ascending.
    /// Reading never creates the history table.
    pub fn executed_versions(&self) -> Result<Vec<i64>, Error> {
        let mut versions = self.runner_factory.create()?.executed_migrations()?;
        versions.sort_unstable();
        Ok(versions)
    }

    fn revert_plan(&self, runner: &mut R::Runner, target: i64) -> Result<RevertPlan, Error> {
        let executed = runner.executed_migrations()?;
        if target > 0 && !executed.contains(&target) {
            return Err(Error::VersionNeverExecuted(target));
        }

        let mut versions: Vec<i64> = executed.into_iter().filter(|v| *v > target).collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();

        let downs = self.finder.down_migrations()?;
        ensure_unique_versions(&downs)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target_version = target,
            to_revert = ?versions,
            available = downs.len(),
            "Considering migrations to revert"
        );

        let scripts = downs.into_iter().map(|m| (m.version(), m)).collect();
        Ok(RevertPlan { versions, scripts })
    }

    fn notify_start(&self, migration: &Migration) {
        if let Some(ref callback) = self.on_migration_start {
            callback(migration.version(), migration.name());
        }
    }

    fn notify_complete(&self) {
        if let Some(ref callback) = self.on_migration_complete {
            callback();
        }
    }
}

struct RevertPlan {
    /// Versions to revert, newest first.
    versions: Vec<i64>,
    scripts: HashMap<i64, Migration>,
}

fn validate_target(version: i64) -> Result<(), Error> {
    if version < 0 {
        return Err(Error::InvalidArgument(format!(
            "target version must be zero or greater, got {}",
            version
        )));
    }
    Ok(())
}

fn pending_up<'a>(migrations: &'a [Migration], executed: &HashSet<i64>) -> Vec<&'a Migration> {
    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !executed.contains(&m.version()))
        .collect();
    pending.sort_by_key(|m| m.version());
    pending
}
