// tests/trigger_queue.rs

use assetpipe::engine::{TriggerQueue, TriggerWhileRunningBehaviour};

fn batch(tasks: &[&str]) -> Vec<String> {
    tasks.iter().map(|t| t.to_string()).collect()
}

#[test]
fn queue_mode_coalesces_into_a_single_follow_up_run() {
    let mut queue = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 1);

    queue.record_batch(&batch(&["styles", "html"]));
    queue.record_batch(&batch(&["scripts", "styles"]));

    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_batch(), Some(batch(&["styles", "html", "scripts"])));
    assert!(queue.is_empty());
    assert_eq!(queue.next_batch(), None);
}

#[test]
fn queue_mode_keeps_separate_batches_up_to_the_limit() {
    let mut queue = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 2);

    queue.record_batch(&batch(&["a"]));
    queue.record_batch(&batch(&["b"]));
    queue.record_batch(&batch(&["c", "b"]));

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.next_batch(), Some(batch(&["a"])));
    assert_eq!(queue.next_batch(), Some(batch(&["b", "c"])));
}

#[test]
fn cancel_mode_keeps_only_the_latest_batch() {
    let mut queue = TriggerQueue::new(TriggerWhileRunningBehaviour::Cancel, 3);

    queue.record_batch(&batch(&["images"]));
    queue.record_batch(&batch(&["scripts"]));
    queue.record_batch(&batch(&["html", "html"]));

    assert_eq!(queue.behaviour(), TriggerWhileRunningBehaviour::Cancel);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_batch(), Some(batch(&["html"])));
}

#[test]
fn empty_batches_are_ignored_and_zero_length_is_clamped() {
    let mut queue = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 0);

    queue.record_batch(&[]);
    assert!(queue.is_empty());

    queue.record_batch(&batch(&["a"]));
    queue.record_batch(&batch(&["b"]));
    assert_eq!(queue.len(), 1);
}

#[test]
fn drain_pending_merges_in_arrival_order() {
    let mut queue = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 3);

    queue.record_batch(&batch(&["b", "a"]));
    queue.record_batch(&batch(&["c", "a"]));

    assert_eq!(queue.drain_pending(), batch(&["b", "a", "c"]));
    assert!(queue.is_empty());
}
