mod hoisted;
pub mod node;

pub use hoisted::HoistedLocals;
pub use node::{Args, BinaryOp, BoundSlot, Expr, Lambda, LambdaBuilder, Literal, Param, Symbol, UnaryOp};
