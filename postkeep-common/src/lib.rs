pub mod model;
pub mod snowflake;
pub mod util;
pub mod validation;
