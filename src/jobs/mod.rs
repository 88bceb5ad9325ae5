pub mod bidding_sweep_job;
