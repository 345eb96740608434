//! Source-like rendering of expression graphs, for diagnostics and the CLI.

use std::fmt;

use crate::expr::{ElementInit, Expr, ExprKind, GotoKind, MemberBinding, NodeType, ParameterExpr};
use crate::value::Value;

fn operator_symbol(op: NodeType) -> Option<&'static str> {
    use NodeType::*;
    Some(match op {
        Add | AddChecked => "+",
        Subtract | SubtractChecked => "-",
        Multiply | MultiplyChecked => "*",
        Divide => "/",
        Modulo => "%",
        Power => "**",
        And => "&",
        AndAlso => "&&",
        Or => "|",
        OrElse => "||",
        ExclusiveOr => "^",
        Equal => "==",
        NotEqual => "!=",
        LessThan => "<",
        LessThanOrEqual => "<=",
        GreaterThan => ">",
        GreaterThanOrEqual => ">=",
        LeftShift => "<<",
        RightShift => ">>",
        Coalesce => "??",
        Assign => "=",
        AddAssign | AddAssignChecked => "+=",
        SubtractAssign | SubtractAssignChecked => "-=",
        MultiplyAssign | MultiplyAssignChecked => "*=",
        DivideAssign => "/=",
        ModuloAssign => "%=",
        AndAssign => "&=",
        OrAssign => "|=",
        ExclusiveOrAssign => "^=",
        LeftShiftAssign => "<<=",
        RightShiftAssign => ">>=",
        PowerAssign => "**=",
        _ => return None,
    })
}

fn param_name(p: &ParameterExpr) -> String {
    match p.name() {
        Some(name) => name.to_string(),
        None => format!("Param_{}", p.id()),
    }
}

fn list(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, e) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

fn element_inits(f: &mut fmt::Formatter<'_>, inits: &[ElementInit]) -> fmt::Result {
    for (i, init) in inits.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}(", init.add_method.name())?;
        list(f, &init.arguments)?;
        write!(f, ")")?;
    }
    Ok(())
}

fn bindings(f: &mut fmt::Formatter<'_>, bindings: &[MemberBinding]) -> fmt::Result {
    for (i, binding) in bindings.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match binding {
            MemberBinding::Assignment { member, expression } => {
                write!(f, "{} = {}", member.name(), expression)?
            }
            MemberBinding::List { member, initializers } => {
                write!(f, "{} = {{", member.name())?;
                element_inits(f, initializers)?;
                write!(f, "}}")?;
            }
            MemberBinding::Member { member, bindings: nested } => {
                write!(f, "{} = {{", member.name())?;
                self::bindings(f, nested)?;
                write!(f, "}}")?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant(Value::String(s)) => write!(f, "\"{}\"", s),
            ExprKind::Constant(Value::Char(c)) => write!(f, "'{}'", c),
            ExprKind::Constant(value) => write!(f, "{}", value),
            ExprKind::Parameter(p) => write!(f, "{}", param_name(p)),
            ExprKind::Binary { op: NodeType::ArrayIndex, left, right, .. } => {
                write!(f, "{}[{}]", left, right)
            }
            ExprKind::Binary { op, left, right, .. } => match operator_symbol(*op) {
                Some(symbol) => write!(f, "({} {} {})", left, symbol, right),
                None => write!(f, "{}({}, {})", op, left, right),
            },
            ExprKind::Unary { op, operand, .. } => {
                let Some(operand) = operand else {
                    return write!(f, "rethrow");
                };
                match op {
                    NodeType::Negate | NodeType::NegateChecked => write!(f, "-{}", operand),
                    NodeType::UnaryPlus => write!(f, "+{}", operand),
                    NodeType::Quote => write!(f, "{}", operand),
                    NodeType::Convert | NodeType::ConvertChecked => {
                        write!(f, "Convert({}, {})", operand, self.ty())
                    }
                    NodeType::TypeAs => write!(f, "({} As {})", operand, self.ty()),
                    NodeType::Throw => write!(f, "throw({})", operand),
                    other => write!(f, "{}({})", other, operand),
                }
            }
            ExprKind::Conditional { test, if_true, if_false } => {
                write!(f, "IIF({}, {}, {})", test, if_true, if_false)
            }
            ExprKind::Block { variables, expressions } => {
                write!(f, "{{")?;
                for v in variables {
                    write!(f, "var {}; ", param_name(v))?;
                }
                for (i, e) in expressions.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
            ExprKind::Call { instance, method, arguments } => {
                match instance {
                    Some(instance) => write!(f, "{}.{}(", instance, method.name())?,
                    None => write!(f, "{}.{}(", method.declaring_type(), method.name())?,
                }
                list(f, arguments)?;
                write!(f, ")")
            }
            ExprKind::Member { expression, member } => match expression {
                Some(e) => write!(f, "{}.{}", e, member.name()),
                None => write!(f, "{}.{}", member.declaring_type(), member.name()),
            },
            ExprKind::Lambda(lambda) => {
                match lambda.parameters() {
                    [single] => write!(f, "{}", param_name(single))?,
                    params => {
                        let names: Vec<String> = params.iter().map(param_name).collect();
                        write!(f, "({})", names.join(", "))?;
                    }
                }
                write!(f, " => {}", lambda.body())
            }
            ExprKind::New { arguments, .. } => {
                write!(f, "new {}(", self.ty())?;
                list(f, arguments)?;
                write!(f, ")")
            }
            ExprKind::NewArray { bounds: true, expressions } => {
                let element = self.ty().element_type().cloned().unwrap_or_else(|| self.ty().clone());
                write!(f, "new {}[", element)?;
                list(f, expressions)?;
                write!(f, "]")
            }
            ExprKind::NewArray { bounds: false, expressions } => {
                write!(f, "new [] {{")?;
                list(f, expressions)?;
                write!(f, "}}")
            }
            ExprKind::ListInit { new_expression, initializers } => {
                write!(f, "{} {{", new_expression)?;
                element_inits(f, initializers)?;
                write!(f, "}}")
            }
            ExprKind::MemberInit { new_expression, bindings: members } => {
                write!(f, "{} {{", new_expression)?;
                bindings(f, members)?;
                write!(f, "}}")
            }
            ExprKind::Invoke { expression, arguments } => {
                write!(f, "Invoke({}", expression)?;
                for a in arguments {
                    write!(f, ", {}", a)?;
                }
                write!(f, ")")
            }
            ExprKind::Index { object, arguments } => {
                write!(f, "{}[", object)?;
                list(f, arguments)?;
                write!(f, "]")
            }
            ExprKind::Goto { kind, target, value } => {
                let keyword = match kind {
                    GotoKind::Goto => "goto",
                    GotoKind::Return => "return",
                    GotoKind::Break => "break",
                    GotoKind::Continue => "continue",
                };
                write!(f, "{} {}", keyword, target.name().unwrap_or("UnnamedLabel"))?;
                match value {
                    Some(v) => write!(f, " {}", v),
                    None => Ok(()),
                }
            }
            ExprKind::Label { target, .. } => write!(f, "{}:", target.name().unwrap_or("UnnamedLabel")),
            ExprKind::Loop { body, .. } => write!(f, "loop {{ {} }}", body),
            ExprKind::RuntimeVariables(variables) => {
                let names: Vec<String> = variables.iter().map(param_name).collect();
                write!(f, "RuntimeVariables({})", names.join(", "))
            }
            ExprKind::Switch { switch_value, cases, default_body, .. } => {
                write!(f, "switch ({}) {{ ", switch_value)?;
                for case in cases {
                    write!(f, "case ")?;
                    list(f, &case.test_values)?;
                    write!(f, ": {}; ", case.body)?;
                }
                if let Some(body) = default_body {
                    write!(f, "default: {}; ", body)?;
                }
                write!(f, "}}")
            }
            ExprKind::Try { body, handlers, finally, fault } => {
                write!(f, "try {{ {} }}", body)?;
                for handler in handlers {
                    write!(f, " catch ({}", handler.test)?;
                    if let Some(v) = &handler.variable {
                        write!(f, " {}", param_name(v))?;
                    }
                    write!(f, ")")?;
                    if let Some(filter) = &handler.filter {
                        write!(f, " when ({})", filter)?;
                    }
                    write!(f, " {{ {} }}", handler.body)?;
                }
                if let Some(finally) = finally {
                    write!(f, " finally {{ {} }}", finally)?;
                }
                if let Some(fault) = fault {
                    write!(f, " fault {{ {} }}", fault)?;
                }
                Ok(())
            }
            ExprKind::TypeBinary { op, expression, type_operand } => {
                let keyword = if *op == NodeType::TypeIs { "Is" } else { "TypeEqual" };
                write!(f, "({} {} {})", expression, keyword, type_operand)
            }
            ExprKind::Dynamic { delegate_type, arguments } => {
                write!(f, "Dynamic {}(", delegate_type)?;
                list(f, arguments)?;
                write!(f, ")")
            }
            ExprKind::Default => write!(f, "default({})", self.ty()),
            ExprKind::DebugInfo { document, start_line, start_column, end_line, end_column } => {
                write!(
                    f,
                    "<DebugInfo({}: {}, {}, {}, {})>",
                    document.file_name, start_line, start_column, end_line, end_column
                )
            }
            ExprKind::Extension { name, .. } => write!(f, "[{}]", name),
        }
    }
}
