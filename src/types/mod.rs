pub mod expr;
pub mod policy;
pub mod resources;
pub mod template;

pub use expr::Expr;
pub use policy::{PolicyDocument, Principal, Statement};
pub use resources::{RemovalPolicy, Resource, ResourceKind};
pub use template::{Output, Parameter, Template};
