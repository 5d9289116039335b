pub mod scenario_harness;
