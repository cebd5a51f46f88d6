pub mod audio;
pub mod recognizer;
pub mod test_app;
