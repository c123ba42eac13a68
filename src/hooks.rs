//! Type-specific steps run after an app has been created or adopted.
use crate::app::TestApp;
use crate::error::HarnessResult;

pub trait PostCreateHook: Sync {
    fn name(&self) -> &'static str;
    fn applies_to(&self, app_type: &str) -> bool;
    fn after_create(&self, app: &mut TestApp) -> HarnessResult<()>;
}

/// Records where a Jenkins server app serves its UI.
pub struct JenkinsInfoHook;

impl PostCreateHook for JenkinsInfoHook {
    fn name(&self) -> &'static str {
        "jenkins-info"
    }

    fn applies_to(&self, app_type: &str) -> bool {
        app_type.starts_with("jenkins")
    }

    fn after_create(&self, app: &mut TestApp) -> HarnessResult<()> {
        app.jenkins_url = Some(format!("https://{}/", app.hostname()));
        Ok(())
    }
}

pub struct HookRegistry {
    hooks: Vec<Box<dyn PostCreateHook>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        HookRegistry::new(vec![Box::new(JenkinsInfoHook)])
    }
}

impl HookRegistry {
    pub fn new(hooks: Vec<Box<dyn PostCreateHook>>) -> Self {
        HookRegistry { hooks }
    }

    pub fn run(&self, app: &mut TestApp) -> HarnessResult<()> {
        for hook in &self.hooks {
            if !hook.applies_to(&app.app_type) {
                continue;
            }
            tracing::debug!(app = %app.name, hook = hook.name(), "running post-create hook");
            hook.after_create(app)?;
        }
        Ok(())
    }
}
