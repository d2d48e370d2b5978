//! Scheduler 单元测试
//!
//! 测试任务、队列、定时器与事件循环的调度行为


use std::cell::RefCell;
use std::rc::Rc;

/// Shared log that callbacks append to.
pub(super) fn recorder<T: 'static>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[cfg(test)]
mod job_tests {
    use crate::runtime::scheduler::{Job, JobId, JobIdGenerator, JobKind};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId(7).to_string(), "Job(7)");
        assert_eq!(JobId::from(3).inner(), 3);
    }

    #[test]
    fn test_job_kind_display() {
        assert_eq!(JobKind::Microtask.to_string(), "microtask");
        assert_eq!(JobKind::Timer.to_string(), "timer");
        assert_eq!(JobKind::Remote.to_string(), "remote");
    }

    #[test]
    fn test_job_id_generator() {
        let mut ids = JobIdGenerator::new();
        assert_eq!(ids.next(), JobId(0));
        assert_eq!(ids.next(), JobId(1));
        assert_eq!(ids.next(), JobId(2));
    }

    #[test]
    fn test_job_run() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let job = Job::new(JobId(1), JobKind::Microtask, move || flag.set(true));
        assert_eq!(job.id(), JobId(1));
        assert_eq!(job.kind(), JobKind::Microtask);
        assert!(format!("{:?}", job).contains("Microtask"));
        job.run();
        assert!(ran.get());
    }
}
