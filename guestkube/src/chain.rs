use std::fmt;

use tracing::{debug, info, warn};

type Action<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

struct Step<'a> {
    stage: String,
    label: String,
    action: Action<'a>,
}

/// Context attached to the error of a failed step. Recover it with
/// `err.downcast_ref::<StepFailed>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailed {
    pub stage: String,
    pub step: String,
}

impl fmt::Display for StepFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stage.is_empty() {
            write!(f, "{} failed", self.step)
        } else {
            write!(f, "{}: {} failed", self.stage, self.step)
        }
    }
}

/// Steps run one after another, in the order they were added. Nothing is
/// undone when a step fails.
#[derive(Default)]
pub struct Chain<'a> {
    stage: String,
    steps: Vec<Step<'a>>,
}

impl<'a> Chain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, name: impl Into<String>) {
        self.stage = name.into();
    }

    pub fn add<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'a,
    {
        self.steps.push(Step {
            stage: self.stage.clone(),
            label: label.into(),
            action: Box::new(action),
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn labels(&self) -> Vec<(&str, &str)> {
        self.steps
            .iter()
            .map(|step| (step.stage.as_str(), step.label.as_str()))
            .collect()
    }

    /// Stops at the first failing step and returns its error.
    pub fn exec(self) -> anyhow::Result<()> {
        let mut stage = None;
        for step in self.steps {
            announce(&mut stage, &step.stage);
            debug!(step = %step.label, "running");
            let failed = StepFailed {
                stage: step.stage,
                step: step.label,
            };
            (step.action)().map_err(|err| err.context(failed))?;
        }
        Ok(())
    }

    /// Runs every step regardless of failures. The first failure is
    /// returned once all steps have run.
    pub fn exec_all(self) -> anyhow::Result<()> {
        let mut stage = None;
        let mut first = None;
        let mut failures = 0;
        for step in self.steps {
            announce(&mut stage, &step.stage);
            debug!(step = %step.label, "running");
            if let Err(err) = (step.action)() {
                let err = err.context(StepFailed {
                    stage: step.stage,
                    step: step.label,
                });
                warn!("{err:#}");
                failures += 1;
                first.get_or_insert(err);
            }
        }
        match first {
            None => Ok(()),
            Some(err) if failures == 1 => Err(err),
            Some(err) => Err(err.context(format!("{failures} steps failed"))),
        }
    }
}

fn announce(current: &mut Option<String>, stage: &str) {
    if current.as_deref() != Some(stage) {
        if !stage.is_empty() {
            info!("{stage}");
        }
        *current = Some(stage.to_owned());
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use anyhow::anyhow;

    use super::{Chain, StepFailed};

    #[test]
    fn test_runs_in_order() {
        let log = RefCell::new(Vec::new());
        let mut chain = Chain::new();
        chain.stage("first");
        chain.add("one", || {
            log.borrow_mut().push(1);
            Ok(())
        });
        chain.add("two", || {
            log.borrow_mut().push(2);
            Ok(())
        });
        chain.stage("second");
        chain.add("three", || {
            log.borrow_mut().push(3);
            Ok(())
        });

        assert_eq!(
            chain.labels(),
            vec![("first", "one"), ("first", "two"), ("second", "three")]
        );
        chain.exec().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_stops_at_first_failure() {
        let log = RefCell::new(Vec::new());
        let mut chain = Chain::new();
        chain.stage("updating");
        chain.add("one", || {
            log.borrow_mut().push(1);
            Ok(())
        });
        chain.add("two", || Err(anyhow!("disk full")));
        chain.add("three", || {
            log.borrow_mut().push(3);
            Ok(())
        });

        let err = chain.exec().unwrap_err();

        assert_eq!(*log.borrow(), vec![1]);
        let failed = err.downcast_ref::<StepFailed>().expect("step context");
        assert_eq!(failed.stage, "updating");
        assert_eq!(failed.step, "two");
        assert_eq!(format!("{err:#}"), "updating: two failed: disk full");
    }

    #[test]
    fn test_exec_all_keeps_going() {
        let log = RefCell::new(Vec::new());
        let mut chain = Chain::new();
        chain.add("one", || Err(anyhow!("first")));
        chain.add("two", || {
            log.borrow_mut().push(2);
            Ok(())
        });
        chain.add("three", || Err(anyhow!("third")));

        let err = chain.exec_all().unwrap_err();

        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(err.to_string(), "2 steps failed");
        let failed = err.downcast_ref::<StepFailed>().expect("step context");
        assert_eq!(failed.step, "one");
    }

    #[test]
    fn test_empty_chain() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        assert!(chain.exec().is_ok());
        assert!(Chain::new().exec_all().is_ok());
    }
}
