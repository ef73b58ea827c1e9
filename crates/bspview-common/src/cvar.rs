// cvar.rs — configuration variables
//
// Values come from registered defaults, then config files of
// `set name "value"` lines, then `+set name value` on the command line.

use std::collections::HashMap;
use std::path::Path;

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::lumps::{DecodeSettings, PARALLEL_LUMP_THRESHOLD};
use crate::parse::tokenize_line;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CvarFlags: u32 {
        /// Written out by `write_variables`.
        const ARCHIVE = 0x1;
        /// Only changeable through `force_set`.
        const NOSET = 0x8;
    }
}

pub const DEVELOPER: &str = "developer";
pub const BSP_PARALLEL: &str = "bsp_parallel";
pub const BSP_PARALLEL_THRESHOLD: &str = "bsp_parallel_threshold";
pub const R_NOVIS: &str = "r_novis";

/// A configuration variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

#[derive(Debug, Clone, Default)]
pub struct CvarContext {
    cvar_vars: Vec<Cvar>,
    /// name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every variable the loader reads.
    pub fn with_defaults() -> Self {
        let mut ctx = Self::new();
        ctx.get(DEVELOPER, "0", CvarFlags::empty());
        ctx.get(BSP_PARALLEL, "1", CvarFlags::ARCHIVE);
        ctx.get(
            BSP_PARALLEL_THRESHOLD,
            &PARALLEL_LUMP_THRESHOLD.to_string(),
            CvarFlags::ARCHIVE,
        );
        ctx.get(R_NOVIS, "0", CvarFlags::empty());
        ctx
    }

    pub fn vars(&self) -> &[Cvar] {
        &self.cvar_vars
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Numeric value, 0 if the variable does not exist.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    /// String value, "" if the variable does not exist.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Get or create a variable. An existing variable keeps its value and
    /// gains `flags`.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> &Cvar {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return &self.cvar_vars[idx];
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: value.parse::<f32>().unwrap_or(0.0),
        });
        self.cvar_index.insert(name.to_string(), idx);
        &self.cvar_vars[idx]
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> bool {
        let idx = match self.cvar_index.get(name) {
            Some(&idx) => idx,
            None => {
                self.get(name, value, CvarFlags::empty());
                return true;
            }
        };

        let var = &mut self.cvar_vars[idx];
        if !force && var.flags.contains(CvarFlags::NOSET) {
            warn!(cvar = name, "{} is write protected", name);
            return false;
        }
        if var.string == value {
            return true;
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = value.parse::<f32>().unwrap_or(0.0);
        true
    }

    /// Set a variable, creating it if needed. Refused for NOSET variables.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        self.set2(name, value, false)
    }

    /// Set a variable regardless of NOSET.
    pub fn force_set(&mut self, name: &str, value: &str) -> bool {
        self.set2(name, value, true)
    }

    pub fn set_value(&mut self, name: &str, value: f32) -> bool {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str)
    }

    /// Clear and return the modified flag.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.cvar_index.get(name) {
            Some(&idx) => std::mem::take(&mut self.cvar_vars[idx].modified),
            None => false,
        }
    }

    /// Run the `set` lines of a config file. Other lines are skipped with a
    /// warning. Returns the number of variables set.
    pub fn exec_config(&mut self, text: &str) -> usize {
        let mut applied = 0;
        for (lineno, line) in text.lines().enumerate() {
            let args = tokenize_line(line);
            match args.as_slice() {
                [] => {}
                ["set", name, value] => {
                    if self.set(name, value) {
                        applied += 1;
                    }
                }
                [cmd, ..] => {
                    warn!(line = lineno + 1, "config: ignoring \"{}\"", cmd);
                }
            }
        }
        applied
    }

    pub fn exec_file(&mut self, path: &Path) -> std::io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let applied = self.exec_config(&text);
        debug!(path = %path.display(), applied, "executed config");
        Ok(applied)
    }

    /// Apply `+set name value` triples and return the remaining arguments
    /// in order.
    pub fn apply_command_line(&mut self, args: &[String]) -> Vec<String> {
        let mut rest = Vec::new();
        let mut i = 0;
        while i < args.len() {
            if args[i] == "+set" {
                if i + 2 < args.len() {
                    self.set(&args[i + 1], &args[i + 2]);
                    i += 3;
                } else {
                    warn!("+set: usage: +set <variable> <value>");
                    i = args.len();
                }
                continue;
            }
            rest.push(args[i].clone());
            i += 1;
        }
        rest
    }

    /// Write archived variables as `set` lines.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.cvar_vars {
            if var.flags.contains(CvarFlags::ARCHIVE) {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }
}

// ============================================================
// Loader settings
// ============================================================

/// Snapshot of the variables one load reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderSettings {
    pub decode: DecodeSettings,
    /// Disable visibility culling.
    pub novis: bool,
}

impl LoaderSettings {
    pub fn from_cvars(cvars: &CvarContext) -> Self {
        let threshold = cvars.variable_value(BSP_PARALLEL_THRESHOLD);
        Self {
            decode: DecodeSettings {
                parallel: cvars.variable_value(BSP_PARALLEL) != 0.0,
                parallel_threshold: if threshold >= 1.0 {
                    threshold as usize
                } else {
                    PARALLEL_LUMP_THRESHOLD
                },
            },
            novis: cvars.variable_value(R_NOVIS) != 0.0,
        }
    }
}
