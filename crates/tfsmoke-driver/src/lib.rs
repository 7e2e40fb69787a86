pub mod aws;
mod credentials;
pub mod driver;
pub mod error;
pub mod region;
mod sigv4;
pub mod terraform;
pub mod workspace;

pub use aws::{AwsInventory, AwsInventoryConfig};
pub use driver::{CommandLog, Inventory, Provisioner, TerraformOptions};
pub use error::DriverError;
pub use region::{first_availability_zones, random_stable_region, stable_candidates};
pub use terraform::TerraformRunner;
pub use workspace::{copy_module_to_temp, ModuleWorkspace};
