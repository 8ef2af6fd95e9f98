//! Property 6 (no loss under descriptor-table pressure) and scenario S3: artificially exhaust
//! the process descriptor table, push a burst of sends, and confirm every descriptor is still
//! delivered, in order, once slots free up again.
//!
//! This lives in its own test binary (a separate OS process) because it lowers the process's
//! `RLIMIT_NOFILE` soft limit for the duration of the test; isolating it keeps that from
//! affecting any other test running concurrently in the same process.

use fdpasser::{socketpair, Config, Endpoints, Passer, TokioReactor};
use std::cell::RefCell;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd")
        .expect("read /proc/self/fd")
        .count()
}

/// Restores the original `RLIMIT_NOFILE` on drop, so a panic partway through the test doesn't
/// leave the process (which, being a dedicated test binary, is about to exit anyway) wedged at
/// an artificially low limit.
struct RlimitGuard(libc::rlimit);

impl Drop for RlimitGuard {
    fn drop(&mut self) {
        unsafe {
            libc::setrlimit(libc::RLIMIT_NOFILE, &self.0);
        }
    }
}

fn lower_nofile_soft_limit(new_soft: libc::rlim_t) -> RlimitGuard {
    let mut original: libc::rlimit = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut original) };
    assert_eq!(rc, 0, "getrlimit(RLIMIT_NOFILE) failed");
    let guard = RlimitGuard(original);
    let lowered = libc::rlimit {
        rlim_cur: new_soft,
        rlim_max: original.rlim_max,
    };
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lowered) };
    assert_eq!(rc, 0, "setrlimit(RLIMIT_NOFILE) failed");
    guard
}

async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn all_descriptors_delivered_in_order_despite_table_exhaustion() {
    LocalSet::new()
        .run_until(async {
            let (a, b) = socketpair().expect("socketpair");
            let parent = Passer::new(Config::new(Endpoints::One(a)), TokioReactor::new())
                .expect("construct parent passer");
            let child = Passer::new(Config::new(Endpoints::One(b)), TokioReactor::new())
                .expect("construct child passer");

            const N: usize = 5;
            let payloads: Vec<File> = (0..N)
                .map(|_| File::open("/dev/null").expect("/dev/null"))
                .collect();

            let baseline = open_fd_count();
            // Small headroom: a handful of slots for the sentinel's own reacquire attempts
            // during the test, tight enough that only a few filler opens are needed to exhaust
            // it.
            let _rlimit_guard = lower_nofile_soft_limit((baseline + 6) as libc::rlim_t);

            let mut fillers = Vec::new();
            loop {
                match File::open("/dev/null") {
                    Ok(f) => fillers.push(f),
                    Err(err) => {
                        assert!(
                            matches!(err.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE)),
                            "expected table exhaustion, got {err}"
                        );
                        break;
                    }
                }
                assert!(fillers.len() < 10_000, "table never filled; rlimit too high");
            }

            let delivered_order = Rc::new(RefCell::new(Vec::new()));
            for (i, payload) in payloads.into_iter().enumerate() {
                let fd: OwnedFd = payload.into();
                parent.push_send_fh(fd, None);

                let delivered_order = delivered_order.clone();
                child.push_recv_fh(Box::new(move |result| {
                    assert!(result.is_ok(), "descriptor {i} must still be delivered, never dropped");
                    delivered_order.borrow_mut().push(i);
                }));
            }

            // Let the first release-before-recv cycle run; per the outcome table this admits
            // exactly one descriptor before the sentinel fails to reacquire and retry mode
            // engages, so we expect progress to stall with at least one, but not all, delivered.
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(
                delivered_order.borrow().len() < N,
                "retry mode should still be gating the remaining waiters"
            );

            // Release pressure gradually, mirroring S3's "closes one filler slot per interval".
            while !fillers.is_empty() {
                fillers.pop();
                tokio::time::sleep(Duration::from_millis(250)).await;
                if delivered_order.borrow().len() == N {
                    break;
                }
            }

            let ok = wait_until(Duration::from_secs(3), || delivered_order.borrow().len() == N).await;
            assert!(ok, "all {N} descriptors should eventually be delivered");
            assert_eq!(*delivered_order.borrow(), (0..N).collect::<Vec<_>>());
        })
        .await;
}
