use std::collections::HashSet;
use std::fmt::Display;

/// A virtual register, unique within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempId(pub u32);

impl Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The two machine-level types: 32-bit integers and pointers. Strings are
/// pointers to runtime-managed storage, frames are pointers to records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrType {
    I32,
    Ptr,
}

impl Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::I32 => write!(f, "i32"),
            IrType::Ptr => write!(f, "ptr"),
        }
    }
}

/// An operand: a constant, a reference into the module's string table, a
/// virtual register, or an incoming function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Const(i32),
    Str(usize),
    Temp(TempId),
    Arg(usize),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(value) => write!(f, "{}", value),
            Value::Str(index) => write!(f, "@str.{}", index),
            Value::Temp(temp) => write!(f, "{}", temp),
            Value::Arg(index) => write!(f, "$arg{}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::CmpEq => "cmp.eq",
            BinOp::CmpNe => "cmp.ne",
            BinOp::CmpLt => "cmp.lt",
            BinOp::CmpLe => "cmp.le",
            BinOp::CmpGt => "cmp.gt",
            BinOp::CmpGe => "cmp.ge",
        };
        write!(f, "{}", repr)
    }
}

#[derive(Debug, Clone)]
pub enum Instruction {
    /// Stack slot for a non-escaping variable.
    Alloca {
        dest: TempId,
        ty: IrType,
        name: String,
    },
    /// Allocates one frame record; `frame` names a [`FrameType`].
    AllocFrame { dest: TempId, frame: String },
    /// Address of slot `index` of the frame record `base` points at.
    /// Slot 0 is the parent pointer when the frame type declares one.
    SlotAddr {
        dest: TempId,
        frame: String,
        base: Value,
        index: usize,
    },
    Load {
        dest: TempId,
        ty: IrType,
        addr: Value,
    },
    Store { addr: Value, value: Value },
    Binary {
        dest: TempId,
        op: BinOp,
        left: Value,
        right: Value,
    },
    /// `dest` is absent when the callee returns no value.
    Call {
        dest: Option<TempId>,
        callee: String,
        args: Vec<Value>,
    },
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Alloca { dest, ty, name } => {
                write!(f, "{} = alloca {} ; {}", dest, ty, name)
            }
            Instruction::AllocFrame { dest, frame } => {
                write!(f, "{} = allocframe {}", dest, frame)
            }
            Instruction::SlotAddr {
                dest,
                frame,
                base,
                index,
            } => write!(f, "{} = slotaddr {}, {}, {}", dest, frame, base, index),
            Instruction::Load { dest, ty, addr } => write!(f, "{} = load {}, {}", dest, ty, addr),
            Instruction::Store { addr, value } => write!(f, "store {}, {}", addr, value),
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{} = {} {}, {}", dest, op, left, right),
            Instruction::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = call {}(", dest, callee)?;
                } else {
                    write!(f, "call {}(", callee)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Every block ends in exactly one terminator. A branch condition is taken
/// when nonzero.
#[derive(Debug, Clone)]
pub enum Terminator {
    Jump(String),
    Branch {
        cond: Value,
        then_label: String,
        else_label: String,
    },
    Return(Option<Value>),
}

impl Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::Jump(label) => write!(f, "jump {}", label),
            Terminator::Branch {
                cond,
                then_label,
                else_label,
            } => write!(f, "branch {}, {}, {}", cond, then_label, else_label),
            Terminator::Return(Some(value)) => write!(f, "return {}", value),
            Terminator::Return(None) => write!(f, "return"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    /// `None` only while the block is still being built.
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for instruction in &self.instructions {
            writeln!(f, "  {}", instruction)?;
        }
        match &self.terminator {
            Some(terminator) => writeln!(f, "  {}", terminator),
            None => writeln!(f, "  <unterminated>"),
        }
    }
}

/// The record type holding a function's escaping locals.
///
/// When `parent` is present it occupies slot 0 and points at the frame of
/// the lexically enclosing function; named slots start right after it.
#[derive(Debug, Clone)]
pub struct FrameType {
    pub name: String,
    pub parent: Option<String>,
    pub slots: Vec<(String, IrType)>,
}

impl Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame {} {{", self.name)?;
        let mut first = true;
        if let Some(parent) = &self.parent {
            write!(f, " parent: {}", parent)?;
            first = false;
        }
        for (name, ty) in &self.slots {
            if !first {
                write!(f, ",")?;
            }
            write!(f, " {}: {}", name, ty)?;
            first = false;
        }
        write!(f, " }}")
    }
}

/// A lowered function. External functions have no blocks and stand for the
/// runtime primitives; they are printed as `declare` lines.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub return_type: Option<IrType>,
    /// The frame record this function allocates on entry, if any.
    pub frame: Option<String>,
    pub blocks: Vec<BasicBlock>,
    pub is_external: bool,
}

impl Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_external && self.blocks.is_empty() {
            write!(f, "declare {}(", self.name)?;
            for (i, (_, ty)) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", ty)?;
            }
            write!(f, ")")?;
            if let Some(ty) = self.return_type {
                write!(f, " : {}", ty)?;
            }
            return writeln!(f);
        }
        write!(f, "function {}(", self.name)?;
        for (i, (name, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, ty)?;
        }
        write!(f, ")")?;
        if let Some(ty) = self.return_type {
            write!(f, " : {}", ty)?;
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

/// A whole lowered compilation unit.
#[derive(Debug, Default)]
pub struct Module {
    pub frames: Vec<FrameType>,
    pub strings: Vec<String>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    /// Interns a string literal, deduplicating exact repeats.
    pub fn intern_string(&mut self, value: &str) -> usize {
        if let Some(index) = self.strings.iter().position(|s| s == value) {
            return index;
        }
        self.strings.push(value.to_string());
        self.strings.len() - 1
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn frame(&self, name: &str) -> Option<&FrameType> {
        self.frames.iter().find(|f| f.name == name)
    }

    /// Structural well-formedness: every defined function has an entry
    /// block, every block is terminated, every jump target is a block of
    /// the same function, and every callee is declared in the module.
    pub fn verify(&self) -> Result<(), String> {
        let declared: HashSet<&str> = self.functions.iter().map(|f| f.name.as_str()).collect();
        for function in &self.functions {
            if function.is_external && function.blocks.is_empty() {
                continue;
            }
            if function.blocks.is_empty() {
                return Err(format!("function {} has no entry block", function.name));
            }
            let labels: HashSet<&str> =
                function.blocks.iter().map(|b| b.label.as_str()).collect();
            let check_target = |label: &str| -> Result<(), String> {
                if labels.contains(label) {
                    Ok(())
                } else {
                    Err(format!(
                        "function {} jumps to unknown block {}",
                        function.name, label
                    ))
                }
            };
            for block in &function.blocks {
                match &block.terminator {
                    None => {
                        return Err(format!(
                            "block {} of function {} has no terminator",
                            block.label, function.name
                        ))
                    }
                    Some(Terminator::Jump(label)) => check_target(label)?,
                    Some(Terminator::Branch {
                        then_label,
                        else_label,
                        ..
                    }) => {
                        check_target(then_label)?;
                        check_target(else_label)?;
                    }
                    Some(Terminator::Return(_)) => {}
                }
                for instruction in &block.instructions {
                    if let Instruction::Call { callee, .. } = instruction {
                        if !declared.contains(callee.as_str()) {
                            return Err(format!(
                                "function {} calls undeclared {}",
                                function.name, callee
                            ));
                        }
                    }
                    if let Instruction::AllocFrame { frame, .. }
                    | Instruction::SlotAddr { frame, .. } = instruction
                    {
                        if self.frame(frame).is_none() {
                            return Err(format!(
                                "function {} references unknown frame type {}",
                                function.name, frame
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{}", frame)?;
        }
        for (index, value) in self.strings.iter().enumerate() {
            writeln!(f, "@str.{} = {:?}", index, value)?;
        }
        for function in &self.functions {
            if function.is_external && function.blocks.is_empty() {
                write!(f, "{}", function)?;
            }
        }
        for function in &self.functions {
            if !(function.is_external && function.blocks.is_empty()) {
                writeln!(f)?;
                write!(f, "{}", function)?;
            }
        }
        Ok(())
    }
}
