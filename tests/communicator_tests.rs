use halo_poisson::algs::communicator::{Communicator, ThreadComm, Wait};
use halo_poisson::poisson_error::PoissonError;

/// Run `f` on every rank of a fresh thread world and collect results in rank order.
fn on_world<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&ThreadComm) -> T + Sync,
{
    let world = ThreadComm::world(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|c| s.spawn(move || f(c))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn thread_round_trip() {
    let world = ThreadComm::world(2);
    let msg = b"hello";
    world[0].isend(1, 0x10, msg).wait();

    let mut buf = [0u8; 5];
    let got = world[1].irecv(0, 0x10, &mut buf).wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
fn thread_fifo_order() {
    let world = ThreadComm::world(2);
    for i in 0..10u8 {
        world[0].isend(1, 0x11, &[i]).wait();
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        out.push(world[1].irecv(0, 0x11, &mut b).wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
fn truncation_is_ok() {
    let world = ThreadComm::world(2);
    world[0].isend(1, 0x12, &[1, 2, 3, 4, 5, 6]).wait();
    let mut b = [0u8; 4];
    let got = world[1].irecv(0, 0x12, &mut b).wait().unwrap();
    assert_eq!(got, vec![1, 2, 3, 4]);
}

#[test]
fn tags_do_not_mix() {
    let world = ThreadComm::world(2);
    world[0].isend(1, 1, &[1]).wait();
    world[0].isend(1, 2, &[2]).wait();
    let mut b = [0u8; 1];
    assert_eq!(world[1].irecv(0, 2, &mut b).wait().unwrap(), vec![2]);
    assert_eq!(world[1].irecv(0, 1, &mut b).wait().unwrap(), vec![1]);
}

#[test]
fn sendrecv_length_mismatch_is_an_error() {
    let world = ThreadComm::world(2);
    world[0].isend(1, 3, &[0u8; 4]).wait();
    let mut recv = [0u8; 8];
    let err = world[1]
        .sendrecv(None, &[], Some(0), &mut recv, 3)
        .unwrap_err();
    assert!(matches!(err, PoissonError::Comm(_)), "{err:?}");
}

#[test]
fn allreduce_sum_and_max_agree_everywhere() {
    let out = on_world(4, |c| {
        let x = (c.rank() + 1) as f64;
        (c.allreduce_sum(x).unwrap(), c.allreduce_max(-x).unwrap())
    });
    for (sum, max) in out {
        assert_eq!(sum, 10.0);
        assert_eq!(max, -1.0);
    }
}

#[test]
fn allreduce_is_bitwise_identical_across_ranks() {
    let out = on_world(5, |c| c.allreduce_sum(0.1 * (c.rank() as f64 + 1.0).sqrt()).unwrap());
    assert!(out.iter().all(|v| v.to_bits() == out[0].to_bits()));
}

#[test]
fn broadcast_replaces_buffers() {
    let out = on_world(3, |c| {
        let mut buf = if c.rank() == 1 {
            b"from one".to_vec()
        } else {
            vec![0xAA; 2]
        };
        c.broadcast(1, &mut buf).unwrap();
        buf
    });
    assert!(out.iter().all(|b| b == b"from one"));
}

#[test]
fn broadcast_rejects_out_of_range_root() {
    let world = ThreadComm::world(2);
    let mut buf = Vec::new();
    assert!(world[0].broadcast(5, &mut buf).is_err());
}

#[test]
fn barrier_completes_on_all_ranks() {
    let out = on_world(4, |c| {
        c.barrier().unwrap();
        c.barrier().unwrap();
        c.rank()
    });
    assert_eq!(out, vec![0, 1, 2, 3]);
}

#[test]
fn abort_turns_pending_collective_into_error() {
    let out = on_world(2, |c| {
        if c.rank() == 0 {
            c.abort();
            Ok(0.0)
        } else {
            c.allreduce_sum(1.0)
        }
    });
    assert!(matches!(out[1], Err(PoissonError::Aborted)));
}
