mod common;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{Call, Op, ScriptedPlatform};
use viewfleet::broadcast::broadcast_message;
use viewfleet::config::Config;
use viewfleet::session::SessionError;

const A: &str = "+15550001";
const B: &str = "+15550002";
const C: &str = "+15550003";

#[tokio::test(start_paused = true)]
async fn test_every_authorized_account_sends_once() {
    let platform = ScriptedPlatform::new();
    let mut pool = platform.pool(&[A, B, C], &Config::default());

    let report = broadcast_message(&mut pool, "alice", "hello", &CancellationToken::new()).await;

    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 0);
    let mut senders: Vec<String> = platform
        .message_calls()
        .into_iter()
        .map(|(who, to, text)| {
            assert_eq!(to, "alice");
            assert_eq!(text, "hello");
            who
        })
        .collect();
    senders.sort();
    assert_eq!(senders, vec![A.to_string(), B.to_string(), C.to_string()]);
    for phone in [A, B, C] {
        assert_eq!(platform.calls_by(phone).last(), Some(&Call::Disconnect));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_and_locked_accounts_are_skipped() {
    // C stands for a session behind a second-factor lock
    let platform = ScriptedPlatform::new().unauthorized(B).fail(
        C,
        Op::Authorize,
        SessionError::Unauthorized,
    );
    let mut pool = platform.pool(&[A, B, C], &Config::default());

    let report = broadcast_message(&mut pool, "alice", "hi", &CancellationToken::new()).await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 2);
    let senders: Vec<String> = platform
        .message_calls()
        .into_iter()
        .map(|(who, _, _)| who)
        .collect();
    assert_eq!(senders, vec![A.to_string()]);
    assert!(pool.find(B).unwrap().is_deactivated());
    assert!(pool.find(C).unwrap().is_deactivated());
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_counts_against_the_total() {
    let platform =
        ScriptedPlatform::new().fail(B, Op::Send, SessionError::transient("peer flood"));
    let mut pool = platform.pool(&[A, B], &Config::default());

    let report = broadcast_message(&mut pool, "alice", "hi", &CancellationToken::new()).await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(pool.find(A).unwrap().success_count(), 1);
    assert_eq!(pool.find(B).unwrap().error_count(), 1);
}
