//! Per-test fixture bundling the context, the model and the daemon.

use logrig_config::HarnessSettings;
use tracing::info;

use crate::context::TestContext;
use crate::error::{ConfigError, HarnessError};
use crate::ids::StatementId;
use crate::model::{ConfigModel, DriverProperty, GenerateOptions};
use crate::options::OptionMap;
use crate::process::{DaemonState, LifecycleError, ProcessController, StopOutcome};

const TESTCASE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::testcase");

/// Everything one functional test needs.
///
/// The daemon is declared first so it is killed before the run directory it
/// writes into is removed.
#[derive(Debug)]
pub struct Testcase {
    daemon: ProcessController,
    config: ConfigModel,
    context: TestContext,
}

impl Testcase {
    /// Prepares a run directory, an empty model and a stopped controller.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Context`] when the settings are invalid or the
    /// run directory cannot be created.
    pub fn new(settings: HarnessSettings) -> Result<Self, HarnessError> {
        let context = TestContext::new(settings)?;
        let daemon = ProcessController::new(&context);
        info!(
            target: TESTCASE_TARGET,
            run_dir = %context.run_dir().display(),
            "prepared testcase"
        );
        Ok(Self {
            daemon,
            config: ConfigModel::new(),
            context,
        })
    }

    /// Replaces the controller, e.g. to adjust markers or arguments.
    #[must_use]
    pub fn with_daemon(
        mut self,
        configure: impl FnOnce(ProcessController) -> ProcessController,
    ) -> Self {
        let daemon = ProcessController::new(&self.context);
        self.daemon = configure(daemon);
        self
    }

    /// Run-scoped resources.
    #[must_use]
    pub const fn context(&self) -> &TestContext {
        &self.context
    }

    /// Configuration graph.
    #[must_use]
    pub const fn config(&self) -> &ConfigModel {
        &self.config
    }

    /// Configuration graph.
    pub const fn config_mut(&mut self) -> &mut ConfigModel {
        &mut self.config
    }

    /// Process controller.
    #[must_use]
    pub const fn daemon(&self) -> &ProcessController {
        &self.daemon
    }

    /// Process controller.
    pub const fn daemon_mut(&mut self) -> &mut ProcessController {
        &mut self.daemon
    }

    /// See [`ConfigModel::create_source`].
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the model.
    pub fn create_source(
        &mut self,
        driver: &str,
        driver_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<(StatementId, DriverProperty), ConfigError> {
        self.config
            .create_source(&mut self.context, driver, driver_options, use_mandatory_options)
    }

    /// See [`ConfigModel::create_destination`].
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the model.
    pub fn create_destination(
        &mut self,
        driver: &str,
        driver_options: &OptionMap,
        use_mandatory_options: bool,
    ) -> Result<(StatementId, DriverProperty), ConfigError> {
        self.config
            .create_destination(&mut self.context, driver, driver_options, use_mandatory_options)
    }

    /// See [`ConfigModel::generate_config`].
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigError`] from the model.
    pub fn generate_config(&mut self, options: GenerateOptions) -> Result<String, ConfigError> {
        self.config.generate_config(&mut self.context, options)
    }

    /// Generates the configuration and starts the daemon with it.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when generation fails and
    /// [`HarnessError::Lifecycle`] when the daemon does not come up.
    pub fn start(&mut self, options: GenerateOptions) -> Result<String, HarnessError> {
        let text = self.generate_config(options)?;
        self.daemon.start(&text)?;
        Ok(text)
    }

    /// Regenerates the configuration and reloads the running daemon.
    ///
    /// A reload always supersedes the previous generation, so
    /// `re_create_config` is forced on whatever the caller passes.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Lifecycle`] without regenerating when the
    /// daemon is not running, [`HarnessError::Config`] when generation
    /// fails, and lifecycle errors from the reload itself.
    pub fn reload(&mut self, options: GenerateOptions) -> Result<String, HarnessError> {
        let state = self.daemon.state();
        if state != DaemonState::Running {
            return Err(LifecycleError::InvalidState {
                operation: "reload",
                state,
            }
            .into());
        }
        let text = self.generate_config(GenerateOptions {
            re_create_config: true,
            ..options
        })?;
        self.daemon.reload_with(&text)?;
        Ok(text)
    }

    /// Stops the daemon.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Lifecycle`] when termination fails.
    pub fn stop(&mut self) -> Result<StopOutcome, HarnessError> {
        Ok(self.daemon.stop()?)
    }
}
