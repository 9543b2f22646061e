//! End-to-end tests for the job queue: retries, terminal errors, groups and
//! progress accounting under concurrency.

use jobq::prelude::*;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct Task {
    id: usize,
    retries: u32,
    fail: bool,
}

impl Task {
    fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Records every attempt, fails tasks marked `fail`, asks for a retry while
/// `retries` is non-zero and otherwise returns the task id.
#[derive(Clone)]
struct Recorder {
    calls: Arc<Mutex<Vec<usize>>>,
    gate: Option<watch::Receiver<bool>>,
    gated_from: usize,
}

impl Recorder {
    fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: None,
            gated_from: usize::MAX,
        }
    }

    /// Tasks with `id >= gated_from` wait until the gate opens.
    fn gated(gated_from: usize, gate: watch::Receiver<bool>) -> Self {
        Self {
            gate: Some(gate),
            gated_from,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    fn attempts_per_task(&self) -> HashMap<usize, usize> {
        let mut attempts = HashMap::new();
        for id in self.calls() {
            *attempts.entry(id).or_default() += 1;
        }
        attempts
    }
}

#[async_trait]
impl Processor<Task> for Recorder {
    type Output = usize;

    async fn process(&self, task: &mut Task) -> JobqResult<usize> {
        self.calls.lock().unwrap().push(task.id);

        if task.id >= self.gated_from {
            if let Some(gate) = &self.gate {
                let mut gate = gate.clone();
                let _ = gate.wait_for(|open| *open).await;
            }
        }

        if task.fail {
            return Err(JobqError::task_failed(format!("task {} failed", task.id)));
        }
        if task.retries > 0 {
            task.retries -= 1;
            return Err(JobqError::retry_with(io::Error::other("transient")));
        }
        Ok(task.id)
    }
}

fn spawn_collector<G>(source: Arc<G>) -> tokio::task::JoinHandle<Vec<JobqResult<usize>>>
where
    G: TaskGroup<Task, usize> + 'static,
{
    tokio::spawn(async move {
        let mut outcomes = Vec::new();
        while let Some(outcome) = source.next().await {
            outcomes.push(outcome);
        }
        outcomes
    })
}

fn split(outcomes: Vec<JobqResult<usize>>) -> (Vec<usize>, Vec<JobqError>) {
    let mut ok = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(id) => ok.push(id),
            Err(e) => errors.push(e),
        }
    }
    ok.sort();
    (ok, errors)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_task_yields_one_outcome() {
    let recorder = Recorder::new();
    let queue = Arc::new(JobQueue::new(recorder.clone(), 4, 8).unwrap());
    queue.start().await.unwrap();
    let collector = spawn_collector(Arc::clone(&queue));

    for id in 0..50 {
        queue.add(Task::new(id)).await.unwrap();
    }
    queue.wait_for_completion().await;
    assert_eq!(queue.progress(), 1.0);
    queue.stop().await.unwrap();

    let (ok, errors) = split(collector.await.unwrap());
    assert!(errors.is_empty());
    assert_eq!(ok, (0..50).collect::<Vec<_>>());
    assert_eq!(recorder.calls().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_outcomes_with_group() {
    let recorder = Recorder::new();
    let queue = Arc::new(JobQueue::new(recorder.clone(), 3, 10).unwrap());
    queue.start().await.unwrap();
    let collector = spawn_collector(Arc::clone(&queue));
    let group = queue.group();

    for id in 0..10 {
        let task = Task {
            id,
            retries: u32::from(id == 6),
            fail: id == 5,
        };
        if id == 7 {
            group.add(task).await.unwrap();
        } else {
            queue.add(task).await.unwrap();
        }
    }

    queue.wait_for_completion().await;
    assert_eq!(queue.progress(), 1.0);

    group.wait().await;
    assert_eq!(group.progress(), 1.0);
    group.close().await;
    let mut group_outcomes = Vec::new();
    while let Some(outcome) = group.next().await {
        group_outcomes.push(outcome.unwrap());
    }
    assert_eq!(group_outcomes, vec![7]);

    let stats = queue.stats();
    assert_eq!(stats.submitted, 10);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.failed, 1);

    queue.stop().await.unwrap();
    let (ok, errors) = split(collector.await.unwrap());
    assert_eq!(ok, vec![0, 1, 2, 3, 4, 6, 7, 8, 9]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "Task failed: task 5 failed");

    let attempts = recorder.attempts_per_task();
    assert_eq!(attempts[&5], 1);
    assert_eq!(attempts[&6], 2);
    assert_eq!(recorder.calls().len(), 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_many_workers() {
    let recorder = Recorder::new();
    let queue = Arc::new(JobQueue::new(recorder.clone(), 50, 100).unwrap());
    queue.start().await.unwrap();
    let collector = spawn_collector(Arc::clone(&queue));

    let group = Arc::new(queue.group());
    let group_collector = spawn_collector(Arc::clone(&group));

    for id in 0..100 {
        let task = Task {
            id,
            retries: if id == 80 { 3 } else { 0 },
            fail: id == 50,
        };
        if (30..40).contains(&id) {
            group.add(task).await.unwrap();
        } else {
            queue.add(task).await.unwrap();
        }
    }

    queue.wait_for_completion().await;
    group.wait().await;
    group.close().await;
    queue.stop().await.unwrap();

    let (ok, errors) = split(collector.await.unwrap());
    assert_eq!(ok.len(), 99);
    assert_eq!(errors.len(), 1);
    assert!(!ok.contains(&50));

    let (group_ok, group_errors) = split(group_collector.await.unwrap());
    assert_eq!(group_ok, (30..40).collect::<Vec<_>>());
    assert!(group_errors.is_empty());

    let stats = queue.stats();
    assert_eq!(stats.submitted, 100);
    assert_eq!(stats.completed, 100);
    assert_eq!(stats.retried, 3);
    assert_eq!(recorder.attempts_per_task()[&80], 4);
    assert_eq!(recorder.calls().len(), 103);
}

#[tokio::test]
async fn retries_run_before_pending_work() {
    let recorder = Recorder::new();
    let queue = JobQueue::new(recorder.clone(), 1, 8).unwrap();

    queue
        .add(Task {
            id: 1,
            retries: 2,
            fail: false,
        })
        .await
        .unwrap();
    queue.add(Task::new(2)).await.unwrap();
    queue.add(Task::new(3)).await.unwrap();

    queue.start().await.unwrap();
    queue.wait_for_completion().await;
    queue.stop().await.unwrap();

    assert_eq!(recorder.calls(), vec![1, 1, 1, 2, 3]);

    let mut order = Vec::new();
    while let Some(outcome) = queue.next().await {
        order.push(outcome.unwrap());
    }
    assert_eq!(order, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_reflects_completed_share() {
    let (open, gate) = watch::channel(false);
    let recorder = Recorder::gated(5, gate);
    let queue = Arc::new(JobQueue::new(recorder, 3, 10).unwrap());
    queue.start().await.unwrap();
    let collector = spawn_collector(Arc::clone(&queue));

    for id in 0..10 {
        queue.add(Task::new(id)).await.unwrap();
    }

    // Tasks 0..5 finish, the rest hold their workers until the gate opens.
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.stats().completed < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(queue.progress(), 0.5);

    open.send(true).unwrap();

    let mut last = queue.progress();
    while last < 1.0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let current = queue.progress();
        assert!(current >= last);
        assert!(current <= 1.0);
        last = current;
    }

    queue.wait_for_completion().await;
    queue.stop().await.unwrap();
    assert_eq!(collector.await.unwrap().len(), 10);
}

#[tokio::test]
async fn retry_ceiling_from_config() {
    let recorder = Recorder::new();
    let config = JobqConfig {
        workers: WorkerConfig::with_workers(2),
        queue: QueueConfig::default().with_capacity(4).with_max_retries(1),
        ..JobqConfig::testing()
    };
    let queue = JobQueue::with_config(config, recorder.clone()).unwrap();
    queue.start().await.unwrap();

    queue
        .add(Task {
            id: 1,
            retries: 10,
            fail: false,
        })
        .await
        .unwrap();
    queue.wait_for_completion().await;
    queue.stop().await.unwrap();

    let outcome = queue.next().await.unwrap();
    assert!(matches!(
        outcome,
        Err(JobqError::RetriesExhausted { attempts: 2, .. })
    ));
    assert!(queue.next().await.is_none());
    assert_eq!(recorder.calls(), vec![1, 1]);
}

#[tokio::test]
async fn closing_group_keeps_queue_stream() {
    let queue = Arc::new(JobQueue::new(Recorder::new(), 2, 8).unwrap());
    queue.start().await.unwrap();

    let group = queue.group();
    group.close().await;

    // Outcomes still reach the queue even though the group stopped listening.
    for id in 0..4 {
        group.add(Task::new(id)).await.unwrap();
    }
    group.wait().await;
    assert_eq!(group.progress(), 1.0);
    assert!(group.next().await.is_none());

    queue.wait_for_completion().await;
    queue.stop().await.unwrap();
    let mut ok = Vec::new();
    while let Some(outcome) = queue.next().await {
        ok.push(outcome.unwrap());
    }
    ok.sort();
    assert_eq!(ok, vec![0, 1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_share_queue_and_group() {
    const SUBMITTERS: usize = 8;
    const PER_SUBMITTER: usize = 50;

    let recorder = Recorder::new();
    let queue = Arc::new(JobQueue::new(recorder.clone(), 6, 16).unwrap());
    queue.start().await.unwrap();
    let collector = spawn_collector(Arc::clone(&queue));

    let group = Arc::new(queue.group());
    let group_collector = spawn_collector(Arc::clone(&group));

    let mut submitters = Vec::new();
    for s in 0..SUBMITTERS {
        let queue = Arc::clone(&queue);
        let group = Arc::clone(&group);
        submitters.push(tokio::spawn(async move {
            for i in 0..PER_SUBMITTER {
                let id = s * PER_SUBMITTER + i;
                let task = Task {
                    id,
                    retries: u32::from(id % 7 == 0),
                    fail: false,
                };
                // Every other task goes through the group.
                if id % 2 == 0 {
                    group.add(task).await.unwrap();
                } else {
                    queue.add(task).await.unwrap();
                }
            }
        }));
    }
    for submitter in submitters {
        submitter.await.unwrap();
    }

    let total = SUBMITTERS * PER_SUBMITTER;
    queue.wait_for_completion().await;
    group.wait().await;
    group.close().await;

    let stats = queue.stats();
    assert_eq!(stats.submitted, total as u64);
    assert_eq!(stats.completed, stats.submitted);
    assert_eq!(stats.retried, (0..total).filter(|id| id % 7 == 0).count() as u64);
    assert_eq!(stats.failed, 0);

    let group_snapshot = group.snapshot();
    assert_eq!(group_snapshot.submitted, (total / 2) as u64);
    assert_eq!(group_snapshot.completed, group_snapshot.submitted);

    queue.stop().await.unwrap();

    let (ok, errors) = split(collector.await.unwrap());
    assert!(errors.is_empty());
    assert_eq!(ok, (0..total).collect::<Vec<_>>());

    let (group_ok, group_errors) = split(group_collector.await.unwrap());
    assert!(group_errors.is_empty());
    assert_eq!(group_ok, (0..total).step_by(2).collect::<Vec<_>>());
}
