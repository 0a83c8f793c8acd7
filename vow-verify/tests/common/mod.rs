#![allow(dead_code)]

use vow_model::{
    Access, ArithmeticOp, ClassModel, ClassName, Clause, ComparisonOp, Decl, Expression,
    ExpressionType, Field, FieldName, Literal, Local, LocalName, Location, Method, MethodName,
    NameTable, Parameter, ParameterName, Statement, Variable,
};

pub fn param(name: &str) -> Variable {
    typed_param(name, ExpressionType::int())
}

pub fn typed_param(name: &str, ty: ExpressionType) -> Variable {
    Variable::Parameter(Parameter {
        name: ParameterName::new(name),
        ty,
        location: Location::default(),
    })
}

pub fn local(name: &str) -> Variable {
    Variable::Local(Local {
        name: LocalName::new(name),
        ty: ExpressionType::int(),
        location: Location::default(),
    })
}

pub fn field(class: &str, name: &str, initializer: Option<i64>) -> Field {
    Field {
        name: FieldName::new(name),
        ty: ExpressionType::int(),
        initializer: initializer.map(Literal::Int),
        owner: ClassName::new(class),
        property: None,
        location: Location::default(),
    }
}

pub fn var(v: &Variable) -> Expression {
    Expression::var(v.clone())
}

pub fn int(n: i64) -> Expression {
    Expression::int(n)
}

pub fn cmp(op: ComparisonOp, l: Expression, r: Expression) -> Expression {
    Expression::compare(op, l, r)
}

pub fn arith(op: ArithmeticOp, l: Expression, r: Expression) -> Expression {
    Expression::arith(op, l, r)
}

pub fn clause(expr: Expression, line: u32) -> Clause {
    Clause::supported(expr.to_string(), expr, Location::new(line, 1))
}

pub struct MethodBuilder {
    method: Method,
    params: Vec<Decl<Parameter>>,
    locals: Vec<Decl<Local>>,
}

impl MethodBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            method: Method {
                name: MethodName::new(name),
                access: Access::Public,
                return_type: ExpressionType::int(),
                parameters: NameTable::sealed_empty(),
                locals: NameTable::sealed_empty(),
                requires: Vec::new(),
                body: Vec::new(),
                ensures: Vec::new(),
                location: Location::new(1, 1),
            },
            params: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn returns(mut self, ty: ExpressionType) -> Self {
        self.method.return_type = ty;
        self
    }

    pub fn private(mut self) -> Self {
        self.method.access = Access::Private;
        self
    }

    pub fn param(self, name: &str) -> Self {
        self.typed_param(name, ExpressionType::int())
    }

    pub fn typed_param(mut self, name: &str, ty: ExpressionType) -> Self {
        if let Variable::Parameter(p) = typed_param(name, ty) {
            self.params.push(Decl::Supported(p));
        }
        self
    }

    pub fn local(mut self, name: &str) -> Self {
        if let Variable::Local(l) = local(name) {
            self.locals.push(Decl::Supported(l));
        }
        self
    }

    pub fn requires(mut self, expr: Expression) -> Self {
        let line = 10 + self.method.requires.len() as u32;
        self.method.requires.push(clause(expr, line));
        self
    }

    pub fn ensures(mut self, expr: Expression) -> Self {
        let line = 20 + self.method.ensures.len() as u32;
        self.method.ensures.push(clause(expr, line));
        self
    }

    pub fn body(mut self, body: Vec<Statement>) -> Self {
        self.method.body = body;
        self
    }

    pub fn build(mut self) -> Method {
        self.method.parameters = NameTable::sealed_from(self.params).expect("params");
        self.method.locals = NameTable::sealed_from(self.locals).expect("locals");
        self.method
    }
}

pub fn class(name: &str, fields: Vec<Field>, methods: Vec<Method>, invariants: Vec<Clause>) -> ClassModel {
    ClassModel::new(
        ClassName::new(name),
        NameTable::sealed_from(fields.into_iter().map(Decl::Supported)).expect("fields"),
        NameTable::sealed_from(methods.into_iter().map(Decl::Supported)).expect("methods"),
        invariants,
        Location::new(1, 1),
    )
    .expect("class")
}
