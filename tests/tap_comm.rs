//! Topology-aware communication: agreement with the flat communicator and
//! the shape of inter-node traffic

mod common;

use common::{p_matrix, world};
use parsparse::{Partition, TopologyConfig, Transport, PPN_ENV_VAR};

#[test]
fn test_rectangular_scenario_four_per_node() {
    let config = TopologyConfig::from_env_value(Some("4"));
    assert_eq!(config.procs_per_node, 4);

    let results = world(8).run(|comm| {
        let mut p = p_matrix(&comm);
        p.init_tap_comm(&comm, &config).unwrap();

        let x: Vec<f64> = p
            .on_proc_column_map()
            .iter()
            .map(|&g| 1.0 + g as f64)
            .collect();
        let mut flat = vec![0.0; p.partition().local_num_rows];
        let mut tap = vec![0.0; p.partition().local_num_rows];
        p.mult(&comm, &x, &mut flat).unwrap();
        p.tap_mult(&x, &mut tap).unwrap();

        let mut flat_t = vec![0.0; p.partition().local_num_cols];
        let mut tap_t = vec![0.0; p.partition().local_num_cols];
        let ones = vec![1.0; p.partition().local_num_rows];
        p.mult_t(&comm, &ones, &mut flat_t).unwrap();
        p.tap_mult_t(&ones, &mut tap_t).unwrap();

        let tap_comm = p.tap_comm().unwrap();
        (flat, tap, flat_t, tap_t, tap_comm.node(), tap_comm.is_representative())
    });

    for (rank, (flat, tap, flat_t, tap_t, node, rep)) in results.iter().enumerate() {
        assert_eq!(flat, tap, "rank {}", rank);
        common::assert_close(flat_t, tap_t, 1e-12);
        assert_eq!(*node, rank / 4);
        assert_eq!(*rep, rank % 4 == 0);
    }

    // Every row of the 16 x 6 matrix holds at least one entry; with x = 1 + g
    // rank 2's rows are [1 + 1, 1 + 1, 1 + 0] + off-process [1 + 5, 1 + 3, 1 + 0].
    assert_eq!(results[2].0, vec![8.0, 6.0, 1.0]);

    // Column sums of the 0/1 matrix.
    let col_sums: Vec<f64> = results.iter().flat_map(|r| r.2.iter().copied()).collect();
    assert_eq!(col_sums, vec![4.0, 4.0, 4.0, 5.0, 4.0, 6.0]);
}

#[test]
fn test_inter_node_sends_are_bounded() {
    let global = common::scattered(64, 64, 6);
    for ppn in [1, 2, 3, 4] {
        let results = world(8).run(|comm| {
            let partition = Partition::uniform(comm.rank(), comm.size(), 64, 64).unwrap();
            let mut a = common::distribute(&comm, &global, partition);
            let config = TopologyConfig::with_procs_per_node(ppn);
            a.init_tap_comm(&comm, &config).unwrap();

            let tap = a.tap_comm().unwrap();
            let flat = a.comm().unwrap();
            let flat_off_node = flat
                .send_procs()
                .iter()
                .filter(|&&p| config.node_of(p) != config.node_of(comm.rank()))
                .count();
            (tap.is_representative(), tap.inter_node_sends(), tap.num_nodes(), flat_off_node)
        });

        let num_nodes = results[0].2;
        let tap_total: usize = results.iter().map(|r| r.1).sum();
        let flat_total: usize = results.iter().map(|r| r.3).sum();
        for (rank, &(rep, sends, _, _)) in results.iter().enumerate() {
            assert!(sends < num_nodes, "ppn={} rank={} sends={}", ppn, rank, sends);
            if !rep {
                assert_eq!(sends, 0, "ppn={} rank={}", ppn, rank);
            }
        }
        assert!(tap_total <= flat_total, "ppn={}: {} > {}", ppn, tap_total, flat_total);
    }
}

#[test]
fn test_rebuild_after_topology_change() {
    let results = world(6).run(|comm| {
        let partition = Partition::uniform(comm.rank(), comm.size(), 6, 6).unwrap();
        let global = common::scattered(6, 6, 3);
        let mut a = common::distribute(&comm, &global, partition);

        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(2)).unwrap();
        let before = a.tap_comm().unwrap().num_nodes();
        a.init_tap_comm(&comm, &TopologyConfig::with_procs_per_node(3)).unwrap();
        let after = a.tap_comm().unwrap().num_nodes();
        (before, after)
    });
    assert!(results.iter().all(|&r| r == (3, 2)));
}

#[test]
fn test_env_value_parsing() {
    assert_eq!(PPN_ENV_VAR, "PPN");
    assert_eq!(TopologyConfig::from_env_value(Some("8")).procs_per_node, 8);
    assert_eq!(TopologyConfig::from_env_value(Some("-3")).procs_per_node, 1);
    assert_eq!(TopologyConfig::from_env_value(None), TopologyConfig::default());
}
