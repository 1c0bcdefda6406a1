pub mod device_view;
pub mod error;
mod handle;
pub mod model;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod fake_platform;

pub use handle::DeviceViewHandle;
pub use reconciler::ViewSources;
