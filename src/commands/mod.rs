pub mod invoke;
#[cfg(test)]
mod invoke_tests;
