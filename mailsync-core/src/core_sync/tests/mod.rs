/*
    Scenario tests for core_sync

    Test suite covering:
    - The two-pass mailbox scenario
    - Convergence and idempotence
    - Creation propagation with identity assignment
    - Deletion propagation, tombstone pruning and no resurrection
    - Conflict strategies
    - Store, persist and consistency failures
*/

pub mod harness;

pub mod deletion_tests;
