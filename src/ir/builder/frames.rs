use std::{collections::HashMap, fmt};

use crate::ir::{Attrs, BindingBlock, Expr, Functions, GlobalVar, Type, Var};

use super::block_builder::BlockBuilder;

/// The discriminant of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Module,
    Function,
    Block,
    If,
    Then,
    Else,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Module => "module",
            FrameKind::Function => "function",
            FrameKind::Block => "block",
            FrameKind::If => "if",
            FrameKind::Then => "then",
            FrameKind::Else => "else",
        };
        f.write_str(name)
    }
}

/// One open, not yet finished, region of the program.
#[derive(Debug)]
pub enum Frame {
    Module(ModuleFrame),
    Function(FunctionFrame),
    Block(BlockFrame),
    If(IfFrame),
    Then(ThenFrame),
    Else(ElseFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Module(_) => FrameKind::Module,
            Frame::Function(_) => FrameKind::Function,
            Frame::Block(_) => FrameKind::Block,
            Frame::If(_) => FrameKind::If,
            Frame::Then(_) => FrameKind::Then,
            Frame::Else(_) => FrameKind::Else,
        }
    }

    /// The sequence part of function, then and else frames.
    pub fn as_seq(&self) -> Option<&SeqExprFrame> {
        match self {
            Frame::Function(frame) => Some(&frame.seq),
            Frame::Then(frame) => Some(&frame.seq),
            Frame::Else(frame) => Some(&frame.seq),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut SeqExprFrame> {
        match self {
            Frame::Function(frame) => Some(&mut frame.seq),
            Frame::Then(frame) => Some(&mut frame.seq),
            Frame::Else(frame) => Some(&mut frame.seq),
            _ => None,
        }
    }

    pub fn is_dataflow_block(&self) -> bool {
        matches!(self, Frame::Block(block) if block.is_dataflow)
    }
}

/// A frame variant that can be looked up on the frame stack by its type.
pub trait FrameVariant: Sized {
    const KIND: FrameKind;

    fn cast(frame: &Frame) -> Option<&Self>;

    fn cast_mut(frame: &mut Frame) -> Option<&mut Self>;

    /// Takes the variant out of the frame, giving the frame back on a kind mismatch.
    fn from_frame(frame: Frame) -> Result<Self, Frame>;
}

macro_rules! frame_variant {
    ($variant:ident, $ty:ty) => {
        impl FrameVariant for $ty {
            const KIND: FrameKind = FrameKind::$variant;

            fn cast(frame: &Frame) -> Option<&Self> {
                match frame {
                    Frame::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn cast_mut(frame: &mut Frame) -> Option<&mut Self> {
                match frame {
                    Frame::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_frame(frame: Frame) -> Result<Self, Frame> {
                match frame {
                    Frame::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

frame_variant!(Module, ModuleFrame);
frame_variant!(Function, FunctionFrame);
frame_variant!(Block, BlockFrame);
frame_variant!(If, IfFrame);
frame_variant!(Then, ThenFrame);
frame_variant!(Else, ElseFrame);

/// Finished blocks and the value they compute.
#[derive(Debug, Default)]
pub struct SeqExprFrame {
    pub blocks: Vec<BindingBlock>,
    pub output: Option<Expr>,
}

/// Where a function goes once its frame exits, decided when the frame is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Outermost frame, the function is the session result.
    TopLevel,
    /// A global function of the enclosing module.
    Module,
    /// Nothing can take the function, exiting fails.
    Unplaceable,
}

#[derive(Debug)]
pub struct FunctionFrame {
    pub seq: SeqExprFrame,
    pub name: Option<String>,
    pub params: Vec<Var>,
    pub ret_type: Option<Type>,
    pub attrs: Attrs,
    pub block_builder: BlockBuilder,
    pub destination: Destination,
}

#[derive(Debug)]
pub struct BlockFrame {
    pub is_dataflow: bool,
}

#[derive(Debug)]
pub struct IfFrame {
    pub condition: Expr,
    pub then_expr: Option<Expr>,
    pub else_expr: Option<Expr>,
    /// The result name chosen by the then branch, the else branch has to match it.
    pub var_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct ThenFrame {
    pub seq: SeqExprFrame,
}

#[derive(Debug, Default)]
pub struct ElseFrame {
    pub seq: SeqExprFrame,
}

#[derive(Debug, Default)]
pub struct ModuleFrame {
    pub functions: Functions,
    pub global_var_map: HashMap<String, GlobalVar>,
}
