//! End-to-end Go-Back-N transfers over the in-memory link.
//!
//! Every test runs with paused time: a receive timeout fires as soon as all
//! tasks are idle, so recovery by retransmission is deterministic.

mod common;

use gbn_transfer::{
    ack::AckError,
    config::{Config, FaultConfig},
    fault::{FaultInjector, ScriptedDraws},
    session::{SessionError, TransferSummary},
};

use common::{
    quiet_config, transfer, transfer_over_corrupting_link, transfer_with_failed_first_send, Faults,
};

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_fault_free_transfer() {
    let out = transfer(&quiet_config(3, 4), b"HELLOWORLD", Faults::none()).await;

    assert_eq!(
        out.result.unwrap(),
        TransferSummary {
            bytes: 10,
            frames: 3,
            retransmitted: 0
        }
    );
    assert_eq!(out.sink, b"HELLOWORLD");
    assert_eq!(out.data_seqs, vec![1, 2, 3]);
    assert_eq!(out.acks, vec![1, 2, 3]);
    assert_eq!(out.next_expected, 4);
    assert_eq!(out.stats.accepted, 3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_source() {
    let out = transfer(&quiet_config(3, 4), b"", Faults::none()).await;

    assert_eq!(out.result.unwrap(), TransferSummary::default());
    assert!(out.sink.is_empty());
    assert!(out.data_seqs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_window_of_one_is_stop_and_wait() {
    let out = transfer(&quiet_config(1, 3), b"abcdefgh", Faults::none()).await;

    assert_eq!(out.result.unwrap().frames, 3);
    assert_eq!(out.sink, b"abcdefgh");
    assert_eq!(out.data_seqs, vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Lost acknowledgment: the whole outstanding window is resent
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_lost_ack_resends_whole_window() {
    let config = Config {
        sender: FaultConfig {
            loss_percent: 50,
            corrupt_percent: 0,
        },
        ..quiet_config(3, 4)
    };
    // ack 1 delivered, ack 2 lost, everything afterwards delivered
    let faults = Faults {
        ack: FaultInjector::new(ScriptedDraws::new([100, 1], 100)),
        ..Faults::none()
    };

    let out = transfer(&config, b"HELLOWORLD", faults).await;

    assert_eq!(out.result.unwrap().retransmitted, 2);
    // frames 2 and 3 both go out again, not just frame 2
    assert_eq!(out.data_seqs, vec![1, 2, 3, 2, 3]);
    assert_eq!(out.acks, vec![1, 2, 3, 2, 3]);
    assert_eq!(out.sink, b"HELLOWORLD");
    assert_eq!(out.stats.duplicate, 2);
}

// ---------------------------------------------------------------------------
// Every data frame corrupted: nothing is ever accepted
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_corrupted_link_delivers_nothing() {
    let config = Config {
        sender: FaultConfig {
            loss_percent: 0,
            corrupt_percent: 100,
        },
        max_consecutive_timeouts: Some(3),
        ..quiet_config(3, 4)
    };

    let out = transfer_over_corrupting_link(&config, b"HELLOWORLD", Faults::none()).await;

    assert!(matches!(
        out.result,
        Err(SessionError::Ack(AckError::RetriesExhausted(3)))
    ));
    assert!(out.sink.is_empty());
    assert_eq!(out.next_expected, 1);
    assert!(out.acks.is_empty());
    // three first transmissions plus three full-window retransmissions
    assert_eq!(out.data_seqs.len(), 12);
    assert_eq!(out.stats.corrupt, 12);
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_first_send_is_repaired_on_resend() {
    let config = Config {
        sender: FaultConfig {
            loss_percent: 0,
            corrupt_percent: 100,
        },
        ..quiet_config(3, 4)
    };

    let out = transfer(&config, b"HELLOWORLD", Faults::none()).await;

    // Resent frames always carry a good checksum flag.
    assert_eq!(out.result.unwrap().retransmitted, 3);
    assert_eq!(out.data_seqs, vec![1, 2, 3, 1, 2, 3]);
    assert_eq!(out.sink, b"HELLOWORLD");
    assert_eq!(out.stats.corrupt, 3);
}

// ---------------------------------------------------------------------------
// Failed first transmission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_failed_first_send_is_recovered_by_timeout() {
    let config = quiet_config(3, 4);

    let out = transfer_with_failed_first_send(&config, b"HELLOWORLD", Faults::none()).await;

    // Frame 1 stayed in the window, so the timeout resends it with the rest.
    assert_eq!(out.result.unwrap().retransmitted, 3);
    assert_eq!(out.data_seqs, vec![2, 3, 1, 2, 3]);
    assert_eq!(out.sink, b"HELLOWORLD");
    assert_eq!(out.stats.out_of_order, 2);
}

// ---------------------------------------------------------------------------
// Duplicate frame after a lost ack
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_duplicate_is_reacked_not_rewritten() {
    let config = Config {
        sender: FaultConfig {
            loss_percent: 50,
            corrupt_percent: 0,
        },
        ..quiet_config(1, 4)
    };
    // the first ack 1 is lost
    let faults = Faults {
        ack: FaultInjector::new(ScriptedDraws::new([1], 100)),
        ..Faults::none()
    };

    let out = transfer(&config, b"HELLO", faults).await;

    assert!(out.result.is_ok());
    assert_eq!(out.data_seqs, vec![1, 1, 2]);
    assert_eq!(out.acks, vec![1, 1, 2]);
    assert_eq!(out.sink, b"HELLO");
    assert_eq!(out.stats.accepted, 2);
    assert_eq!(out.stats.duplicate, 1);
}

// ---------------------------------------------------------------------------
// Cumulative acknowledgments
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_cumulative_ack_covers_lost_one() {
    let config = Config {
        sender: FaultConfig {
            loss_percent: 50,
            corrupt_percent: 0,
        },
        cumulative_acks: true,
        ..quiet_config(3, 4)
    };
    let faults = Faults {
        ack: FaultInjector::new(ScriptedDraws::new([100, 1], 100)),
        ..Faults::none()
    };

    let out = transfer(&config, b"HELLOWORLD", faults).await;

    // ack 3 slides the window past the lost ack 2; nothing is resent
    assert_eq!(out.result.unwrap().retransmitted, 0);
    assert_eq!(out.data_seqs, vec![1, 2, 3]);
    assert_eq!(out.sink, b"HELLOWORLD");
}

// ---------------------------------------------------------------------------
// Random faults on both paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_seeded_faults_still_deliver_everything() {
    static DATA: [u8; 4096] = {
        let mut data = [0u8; 4096];
        let mut i = 0;
        while i < data.len() {
            data[i] = (i * 31 % 251) as u8;
            i += 1;
        }
        data
    };

    for seed in [1u64, 2, 3] {
        let config = Config {
            sender: FaultConfig::uniform(20),
            receiver: FaultConfig::uniform(20),
            ..quiet_config(5, 100)
        };

        let out = transfer(&config, &DATA, Faults::seeded(seed)).await;

        let summary = out.result.unwrap();
        assert_eq!(summary.bytes, DATA.len() as u64, "seed {seed}");
        assert_eq!(summary.frames, 41, "seed {seed}");
        assert_eq!(out.sink, DATA.to_vec(), "seed {seed}");
        assert_eq!(out.next_expected, 42, "seed {seed}");
    }
}
