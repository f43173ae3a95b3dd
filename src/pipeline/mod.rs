pub mod stage1_statistics;
pub mod stage2_scale;
pub mod stage3_layout;
pub mod stage4_progress;
pub mod stage5_batch;
