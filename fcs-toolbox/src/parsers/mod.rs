pub mod pt3;
