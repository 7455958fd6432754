mod magic_tests;
mod scheduler_tests;
