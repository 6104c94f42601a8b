pub mod batch;
pub mod invoke;
pub mod test_kms;
