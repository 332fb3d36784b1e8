pub mod features;
pub mod matcher;
pub mod motion;
pub mod pose;
pub mod system;
pub mod tracker;
pub mod trajectory;
