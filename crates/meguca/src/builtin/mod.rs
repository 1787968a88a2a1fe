//! Built-in Plugins
//!
//! Generic plugins that need no network access. Useful for wiring up a
//! deployment and for exercising the scheduler end to end.

mod log_view;
mod static_data;
mod sum;

pub use log_view::LogView;
pub use static_data::StaticData;
pub use sum::Sum;

use meguca_runtime::PluginObject;

use crate::catalog::PluginCatalog;

/// Register every built-in under its module name
pub fn register_builtins(catalog: &mut PluginCatalog) {
    catalog.register(StaticData::MODULE, |config| {
        Ok(PluginObject::collector(StaticData::from_config(config)?))
    });
    catalog.register(Sum::MODULE, |config| Ok(PluginObject::stat(Sum::from_config(config)?)));
    catalog.register(LogView::MODULE, |config| {
        Ok(PluginObject::view(LogView::from_config(config)?))
    });
}
