//! Kernel configuration interface
//!

// default configs
const DEFAULT_NAME: &str = "weft";
// max frames on one strand's call stack
const DEFAULT_STACK_LIMIT: usize = 1024;

/// Kernel configuration type
///
/// the config is consumed when the kernel is created, later changes to a
/// copy would not take effect
#[derive(Clone, Debug)]
pub struct Config {
    name: String,
    stack_limit: usize,
    strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: DEFAULT_NAME.to_string(),
            stack_limit: DEFAULT_STACK_LIMIT,
            strict: false,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// set the kernel name, used to tag log lines
    pub fn set_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.name = name.into();
        info!("set name={:?}", self.name);
        self
    }

    /// get the kernel name
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// set the max frame depth of a strand
    ///
    /// if you pass 0 to it, will use internal default
    pub fn set_stack_limit(&mut self, limit: usize) -> &mut Self {
        info!("set stack limit={:?}", limit);
        self.stack_limit = if limit == 0 {
            DEFAULT_STACK_LIMIT
        } else {
            limit
        };
        self
    }

    /// get the max frame depth of a strand
    pub fn get_stack_limit(&self) -> usize {
        self.stack_limit
    }

    /// panic on protocol violations instead of failing the offending frame
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        info!("set strict={:?}", strict);
        self.strict = strict;
        self
    }

    /// get the strict flag
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}
