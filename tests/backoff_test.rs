//! End-to-end seed scenario: backoff escalation on repeated `21104`
//! (invalid nonce) errors.

use arb_collector::backoff::BackoffController;

#[test]
fn repeated_nonce_errors_escalate_120_240_480() {
    let ctrl = BackoffController::new();

    ctrl.register_error("edgex", "21104", "invalid nonce");
    let (_, remaining) = ctrl.pause_info("edgex").unwrap();
    assert!((110..=120).contains(&remaining), "first pause was {remaining}s, expected ~120s");

    ctrl.register_error("edgex", "21104", "invalid nonce");
    let (_, remaining) = ctrl.pause_info("edgex").unwrap();
    assert!((230..=240).contains(&remaining), "second pause was {remaining}s, expected ~240s");

    ctrl.register_error("edgex", "21104", "invalid nonce");
    let (_, remaining) = ctrl.pause_info("edgex").unwrap();
    assert!((470..=480).contains(&remaining), "third pause was {remaining}s, expected ~480s");
}

#[test]
fn manual_reset_returns_venue_to_a_fresh_streak() {
    let ctrl = BackoffController::new();
    ctrl.register_error("edgex", "21104", "invalid nonce");
    ctrl.register_error("edgex", "21104", "invalid nonce");
    ctrl.reset("edgex");

    ctrl.register_error("edgex", "21104", "invalid nonce");
    let (_, remaining) = ctrl.pause_info("edgex").unwrap();
    assert!((110..=120).contains(&remaining), "post-reset pause was {remaining}s, expected ~120s");
}
