pub mod cloud;
pub mod controller;
pub mod crd;
pub mod datahub;
pub mod error;
pub mod helpers;
pub mod nodeinfo;
pub mod quantity;
pub mod resource_link;
