use std::{fmt, io};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub const fn as_str(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arithmetic and logical VM commands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl Command {
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Sub => "sub",
            Command::Neg => "neg",
            Command::Eq => "eq",
            Command::Gt => "gt",
            Command::Lt => "lt",
            Command::And => "and",
            Command::Or => "or",
            Command::Not => "not",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single VM instruction. Every construct of the source language is lowered
/// to a sequence of these.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    Push(Segment, u16),
    Pop(Segment, u16),
    Arithmetic(Command),
    Label(&'a str),
    Goto(&'a str),
    IfGoto(&'a str),
    /// Function name and argument count.
    Call(&'a str, u16),
    /// Function name and local variable count.
    Function(&'a str, u16),
    Return,
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Push(segment, index) => write!(f, "push {segment} {index}"),
            Instruction::Pop(segment, index) => write!(f, "pop {segment} {index}"),
            Instruction::Arithmetic(command) => write!(f, "{command}"),
            Instruction::Label(label) => write!(f, "label {label}"),
            Instruction::Goto(label) => write!(f, "goto {label}"),
            Instruction::IfGoto(label) => write!(f, "if-goto {label}"),
            Instruction::Call(name, argc) => write!(f, "call {name} {argc}"),
            Instruction::Function(name, localc) => write!(f, "function {name} {localc}"),
            Instruction::Return => f.write_str("return"),
        }
    }
}

/// Renders VM instructions, one per line, into the underlying sink.
///
/// No validation is done here: segment/index validity is up to the caller.
pub struct VmWriter<W> {
    writer: W,
    lines: usize,
}

impl<W> VmWriter<W>
where
    W: io::Write,
{
    pub fn new(writer: W) -> VmWriter<W> {
        VmWriter { writer, lines: 0 }
    }

    /// Number of instructions written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn emit(&mut self, instruction: Instruction<'_>) -> io::Result<()> {
        writeln!(self.writer, "{instruction}")?;
        self.lines += 1;
        Ok(())
    }

    pub fn write_push(&mut self, segment: Segment, index: u16) -> io::Result<()> {
        self.emit(Instruction::Push(segment, index))
    }

    pub fn write_pop(&mut self, segment: Segment, index: u16) -> io::Result<()> {
        self.emit(Instruction::Pop(segment, index))
    }

    pub fn write_arithmetic(&mut self, command: Command) -> io::Result<()> {
        self.emit(Instruction::Arithmetic(command))
    }

    pub fn write_label(&mut self, label: &str) -> io::Result<()> {
        self.emit(Instruction::Label(label))
    }

    pub fn write_goto(&mut self, label: &str) -> io::Result<()> {
        self.emit(Instruction::Goto(label))
    }

    pub fn write_if(&mut self, label: &str) -> io::Result<()> {
        self.emit(Instruction::IfGoto(label))
    }

    pub fn write_call(&mut self, name: &str, argc: u16) -> io::Result<()> {
        self.emit(Instruction::Call(name, argc))
    }

    pub fn write_function(&mut self, name: &str, localc: u16) -> io::Result<()> {
        self.emit(Instruction::Function(name, localc))
    }

    pub fn write_return(&mut self) -> io::Result<()> {
        self.emit(Instruction::Return)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
