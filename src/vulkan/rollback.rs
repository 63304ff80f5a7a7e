//! # Rollback Module
//!
//! Startup creates Vulkan objects one after another and any step can fail. A [`Rollback`] holds
//! the destroy call for each object created so far and runs them newest first when it is dropped,
//! unless [`Rollback::commit`] handed ownership of the objects to something else.

/// RAII guard that undoes partially finished construction on drop.
#[derive(Default)]
pub struct Rollback<'a> {
    steps: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'a> Rollback<'a> {
    /// Records how to destroy the object that was just created.
    pub fn push(&mut self, step: impl FnOnce() + 'a) {
        self.steps.push(Box::new(step));
    }

    /// Construction succeeded; none of the recorded steps will run.
    pub fn commit(mut self) {
        self.steps.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            step();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Failed(&'static str);

    /// Creates "instance", "surface" and "device" in order, failing at `fail_at`.
    fn build<'a>(
        log: &'a RefCell<Vec<&'static str>>,
        fail_at: Option<&'static str>,
    ) -> Result<(), Failed> {
        let mut rollback = Rollback::default();

        for object in ["instance", "surface", "device"] {
            if fail_at == Some(object) {
                return Err(Failed(object));
            }
            rollback.push(move || log.borrow_mut().push(object));
        }

        rollback.commit();
        Ok(())
    }

    #[test]
    fn dropping_runs_steps_newest_first() {
        let log = RefCell::new(Vec::new());

        {
            let mut rollback = Rollback::default();
            rollback.push(|| log.borrow_mut().push(1));
            rollback.push(|| log.borrow_mut().push(2));
            rollback.push(|| log.borrow_mut().push(3));
        }

        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn commit_keeps_everything() {
        let log = RefCell::new(Vec::new());

        let mut rollback = Rollback::default();
        rollback.push(|| log.borrow_mut().push(1));
        rollback.commit();

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn failure_midway_destroys_only_what_was_created() {
        let log = RefCell::new(Vec::new());

        assert_eq!(build(&log, Some("device")), Err(Failed("device")));
        assert_eq!(*log.borrow(), vec!["surface", "instance"]);
    }

    #[test]
    fn failure_on_first_step_destroys_nothing() {
        let log = RefCell::new(Vec::new());

        assert_eq!(build(&log, Some("instance")), Err(Failed("instance")));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn successful_build_destroys_nothing() {
        let log = RefCell::new(Vec::new());

        assert_eq!(build(&log, None), Ok(()));
        assert!(log.borrow().is_empty());
    }
}
