pub mod winapi;
