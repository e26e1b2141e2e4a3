// cvar.rs — named configuration variables
//
// Every tunable of the output layer (render mode, shadow style, fog range,
// palette reservation) is a cvar. Values are kept as strings with a cached
// float, the same way the console and config files see them.

use std::collections::HashMap;
use std::io::Write;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Written out by `write_variables`.
        const ARCHIVE = 0x01;
        /// Cannot be changed by `set`.
        const NOSET   = 0x08;
        /// Changes are held until `get_latched_vars` (e.g. the render mode,
        /// which only switches on a renderer restart).
        const LATCH   = 0x10;
    }
}

pub const CVAR_ARCHIVE: CvarFlags = CvarFlags::ARCHIVE;
pub const CVAR_NOSET: CvarFlags = CvarFlags::NOSET;
pub const CVAR_LATCH: CvarFlags = CvarFlags::LATCH;

/// A configuration variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// The cvar table.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Float value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// String value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };
        let var = &mut self.cvar_vars[idx];

        if !force {
            if var.flags.contains(CvarFlags::NOSET) {
                log::warn!("{} is write protected", name);
                return idx;
            }

            if var.flags.contains(CvarFlags::LATCH) {
                let unchanged = match var.latched_string {
                    Some(ref latched) => value == latched,
                    None => value == var.string,
                };
                if !unchanged {
                    log::info!("{} will be changed on renderer restart", name);
                    var.latched_string = Some(value.to_string());
                }
                return idx;
            }
        } else {
            var.latched_string = None;
        }

        if value == var.string {
            return idx;
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Set a cvar value (respects NOSET and LATCH flags).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET and LATCH).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) -> usize {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Apply all latched variable changes.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.cvar_vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Clear and report the modified flag of every cvar whose name starts
    /// with `prefix`. Returns true when at least one was modified.
    pub fn take_modified(&mut self, prefix: &str) -> bool {
        let mut any = false;
        for var in self.cvar_vars.iter_mut().filter(|v| v.name.starts_with(prefix)) {
            if var.modified {
                var.modified = false;
                any = true;
            }
        }
        any
    }

    /// Write `set name "value"` lines for every archived cvar.
    pub fn write_variables<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for var in self.cvar_vars.iter().filter(|v| v.flags.contains(CvarFlags::ARCHIVE)) {
            let value = var.latched_string.as_deref().unwrap_or(&var.string);
            writeln!(out, "set {} \"{}\"", var.name, value)?;
        }
        Ok(())
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvar_get_and_find() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "42", CvarFlags::empty());
        assert_eq!(ctx.variable_value("test_var"), 42.0);
        assert_eq!(ctx.variable_string("test_var"), "42");
    }

    #[test]
    fn test_cvar_get_creates_once() {
        let mut ctx = CvarContext::new();
        ctx.get("test", "1", CvarFlags::empty());
        ctx.get("test", "2", CVAR_ARCHIVE); // should NOT change value
        assert_eq!(ctx.variable_string("test"), "1");
        assert!(ctx.find_var("test").unwrap().flags.contains(CVAR_ARCHIVE));
    }

    #[test]
    fn test_cvar_set() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "10", CvarFlags::empty());
        ctx.set("test_var", "20");
        assert_eq!(ctx.variable_value("test_var"), 20.0);
    }

    #[test]
    fn test_cvar_set_creates_missing() {
        let mut ctx = CvarContext::new();
        ctx.set("r_fog_start", "12288");
        assert_eq!(ctx.variable_value("r_fog_start"), 12288.0);
    }

    #[test]
    fn test_cvar_noset() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "10", CVAR_NOSET);
        ctx.set("test_var", "20"); // should be blocked
        assert_eq!(ctx.variable_value("test_var"), 10.0);
    }

    #[test]
    fn test_cvar_force_set() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "10", CVAR_NOSET);
        ctx.force_set("test_var", "20");
        assert_eq!(ctx.variable_value("test_var"), 20.0);
    }

    #[test]
    fn test_cvar_set_value() {
        let mut ctx = CvarContext::new();
        ctx.get("test_var", "0", CvarFlags::empty());
        ctx.set_value("test_var", 3.0);
        assert_eq!(ctx.variable_string("test_var"), "3");
        ctx.set_value("test_var", 0.5);
        assert_eq!(ctx.variable_value("test_var"), 0.5);
    }

    #[test]
    fn test_cvar_latch() {
        let mut ctx = CvarContext::new();
        ctx.get("r_mode", "0", CVAR_LATCH);
        ctx.set("r_mode", "1");
        assert_eq!(ctx.variable_string("r_mode"), "0"); // not changed yet
        assert_eq!(ctx.cvar_vars[0].latched_string.as_deref(), Some("1"));
        ctx.get_latched_vars();
        assert_eq!(ctx.variable_value("r_mode"), 1.0);
    }

    #[test]
    fn test_cvar_not_found() {
        let ctx = CvarContext::new();
        assert_eq!(ctx.variable_value("nonexistent"), 0.0);
        assert_eq!(ctx.variable_string("nonexistent"), "");
    }

    #[test]
    fn test_take_modified_by_prefix() {
        let mut ctx = CvarContext::new();
        ctx.get("r_zbuffer", "1", CvarFlags::empty());
        ctx.get("s_volume", "1", CvarFlags::empty());
        assert!(ctx.take_modified("r_"));
        assert!(!ctx.take_modified("r_"));
        ctx.set("r_zbuffer", "0");
        assert!(ctx.take_modified("r_"));
        assert!(ctx.take_modified("s_"));
    }

    #[test]
    fn test_write_variables() {
        let mut ctx = CvarContext::new();
        ctx.get("archived_var", "hello", CVAR_ARCHIVE);
        ctx.get("normal_var", "world", CvarFlags::empty());
        let mut buf = Vec::new();
        ctx.write_variables(&mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("set archived_var \"hello\""));
        assert!(!output.contains("normal_var"));
    }
}
