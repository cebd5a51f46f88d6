pub mod fixtures;

#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod pool_tests;
#[cfg(test)]
mod transcription_tests;
