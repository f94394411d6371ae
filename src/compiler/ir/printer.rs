//! Textual and JSON dumps of an [`IrModule`]

use super::instruction::{OpKind, TargetOp};
use super::program::{IrModule, OpId, Region, ValueId};
use super::types::ValueType;
use crate::error::Result;
use serde::Serialize;
use std::fmt::{self, Write};

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for &id in &self.body().ops {
            self.print_op(&mut out, id, 0)?;
        }
        f.write_str(&out)
    }
}

impl IrModule {
    /// Render one operation (with its regions) as it appears in the dump
    pub fn op_to_string(&self, id: OpId) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.print_op_line(&mut out, id);
        out
    }

    fn print_op(&self, out: &mut String, id: OpId, depth: usize) -> fmt::Result {
        let Some(op) = self.get(id) else {
            return writeln!(out, "{}<erased>", "  ".repeat(depth));
        };
        write!(out, "{}", "  ".repeat(depth))?;
        self.print_op_line(out, id)?;

        for region in op.regions() {
            writeln!(out, " {{")?;
            for &child in &region.ops {
                self.print_op(out, child, depth + 1)?;
            }
            write!(out, "{}}}", "  ".repeat(depth))?;
        }
        writeln!(out)
    }

    fn print_op_line(&self, out: &mut String, id: OpId) -> fmt::Result {
        let Some(op) = self.get(id) else {
            return write!(out, "<erased>");
        };

        if let OpKind::FuncDef { name, return_type } = &op.kind {
            write!(out, "func_def @{}(", name)?;
            if let Some(body) = op.regions().first() {
                self.print_args(out, body)?;
            }
            return write!(out, ") -> {}", return_type);
        }

        if let Some(result) = op.result() {
            write!(out, "{} = ", result)?;
        }
        write!(out, "{}", op.kind)?;
        for (i, operand) in op.operands().iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(out, "{}{}", sep, operand)?;
        }
        if let Some(result) = op.result() {
            if let Ok(ty) = self.value_type(result) {
                write!(out, " : {}", ty)?;
            }
        }
        Ok(())
    }

    fn print_args(&self, out: &mut String, region: &Region) -> fmt::Result {
        for (i, &arg) in region.args.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            match self.value_type(arg) {
                Ok(ty) => write!(out, "{}: {}", arg, ty)?,
                Err(_) => write!(out, "{}", arg)?,
            }
        }
        Ok(())
    }

    /// Structured dump of the module as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        let functions: Vec<OpDump<'_>> = self
            .body()
            .ops
            .iter()
            .filter_map(|&id| self.dump_op(id))
            .collect();
        Ok(serde_json::to_string_pretty(&functions)?)
    }

    fn dump_op(&self, id: OpId) -> Option<OpDump<'_>> {
        let op = self.get(id)?;
        let result = op.result().map(|value| ValueDump {
            id: value,
            ty: self.value_type(value).ok().cloned(),
        });
        let regions = op
            .regions()
            .iter()
            .map(|region| RegionDump {
                args: region
                    .args
                    .iter()
                    .map(|&value| ValueDump {
                        id: value,
                        ty: self.value_type(value).ok().cloned(),
                    })
                    .collect(),
                ops: region.ops.iter().filter_map(|&child| self.dump_op(child)).collect(),
            })
            .collect();
        Some(OpDump {
            kind: &op.kind,
            operands: op.operands().to_vec(),
            result,
            regions,
        })
    }

    /// Number of flat target ops (labels excluded)
    pub fn target_instruction_count(&self) -> usize {
        self.walk()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter(|op| matches!(&op.kind, OpKind::Target(t) if !matches!(t, TargetOp::Label(_))))
            .count()
    }
}

#[derive(Serialize)]
struct ValueDump {
    id: ValueId,
    ty: Option<ValueType>,
}

#[derive(Serialize)]
struct RegionDump<'a> {
    args: Vec<ValueDump>,
    ops: Vec<OpDump<'a>>,
}

#[derive(Serialize)]
struct OpDump<'a> {
    kind: &'a OpKind,
    operands: Vec<ValueId>,
    result: Option<ValueDump>,
    regions: Vec<RegionDump<'a>>,
}
