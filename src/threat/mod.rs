pub mod intelligence;
