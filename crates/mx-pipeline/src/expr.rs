//! Selection expressions over event observables.
//!
//! Arithmetic (`+ - * /`), comparisons (`== != < <= > >=`), boolean
//! operators (`&& || !`) and the functions `abs sqrt log exp pow min max`.
//! Identifiers must name an [`Observable`]; anything else is rejected when
//! the expression is compiled, not when it is evaluated.

use std::fmt;

use mx_core::{Error, Result};

use crate::event::Event;

/// Event quantities an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observable {
    /// Leading photon pT (0 without photons).
    PhotonPt,
    /// Leading photon eta.
    PhotonEta,
    /// Leading photon phi.
    PhotonPhi,
    /// MET magnitude.
    Met,
    /// MET azimuth.
    MetPhi,
    /// Jet multiplicity.
    NJet,
    /// Reconstructed vertex count.
    Npv,
    /// Photon multiplicity.
    NPhoton,
    /// Electron multiplicity.
    NElectron,
    /// Muon multiplicity.
    NMuon,
    /// Generator weight.
    Weight,
}

impl Observable {
    const ALL: [Observable; 11] = [
        Observable::PhotonPt,
        Observable::PhotonEta,
        Observable::PhotonPhi,
        Observable::Met,
        Observable::MetPhi,
        Observable::NJet,
        Observable::Npv,
        Observable::NPhoton,
        Observable::NElectron,
        Observable::NMuon,
        Observable::Weight,
    ];

    /// Identifier used in expressions.
    pub fn name(self) -> &'static str {
        match self {
            Observable::PhotonPt => "photon_pt",
            Observable::PhotonEta => "photon_eta",
            Observable::PhotonPhi => "photon_phi",
            Observable::Met => "met",
            Observable::MetPhi => "met_phi",
            Observable::NJet => "njet",
            Observable::Npv => "npv",
            Observable::NPhoton => "nphoton",
            Observable::NElectron => "nelectron",
            Observable::NMuon => "nmuon",
            Observable::Weight => "weight",
        }
    }

    /// Look up an identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.name() == name)
    }

    /// Value on an input event.
    pub fn value(self, ev: &Event) -> f64 {
        let lead = ev.photons.first();
        match self {
            Observable::PhotonPt => lead.map_or(0.0, |p| p.pt),
            Observable::PhotonEta => lead.map_or(0.0, |p| p.eta),
            Observable::PhotonPhi => lead.map_or(0.0, |p| p.phi),
            Observable::Met => ev.met.pt,
            Observable::MetPhi => ev.met.phi,
            Observable::NJet => ev.jets.len() as f64,
            Observable::Npv => f64::from(ev.npv),
            Observable::NPhoton => ev.photons.len() as f64,
            Observable::NElectron => ev.electrons.len() as f64,
            Observable::NMuon => ev.muons.len() as f64,
            Observable::Weight => ev.weight,
        }
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Syntax tree ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Obs(Observable),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    /// Left binding power; comparisons bind tighter than `&&`, arithmetic tighter still.
    fn binding_power(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div => 5,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            BinOp::Or => truth(a > 0.0 || b > 0.0),
            BinOp::And => truth(a > 0.0 && b > 0.0),
            BinOp::Eq => truth((a - b).abs() < f64::EPSILON),
            BinOp::Ne => truth((a - b).abs() >= f64::EPSILON),
            BinOp::Lt => truth(a < b),
            BinOp::Le => truth(a <= b),
            BinOp::Gt => truth(a > b),
            BinOp::Ge => truth(a >= b),
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
        }
    }
}

const PREFIX_POWER: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Pow,
    Min,
    Max,
}

impl Func {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "exp" => Func::Exp,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

// ── Lexer ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(BinOp),
    Minus,
    Bang,
    LParen,
    RParen,
    Comma,
}

fn lex(src: &str) -> Result<Vec<Tok>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let next = bytes.get(i + 1).map(|&b| b as char);

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let (tok, width) = match (c, next) {
            ('&', Some('&')) => (Tok::Op(BinOp::And), 2),
            ('|', Some('|')) => (Tok::Op(BinOp::Or), 2),
            ('=', Some('=')) => (Tok::Op(BinOp::Eq), 2),
            ('!', Some('=')) => (Tok::Op(BinOp::Ne), 2),
            ('<', Some('=')) => (Tok::Op(BinOp::Le), 2),
            ('>', Some('=')) => (Tok::Op(BinOp::Ge), 2),
            ('<', _) => (Tok::Op(BinOp::Lt), 1),
            ('>', _) => (Tok::Op(BinOp::Gt), 1),
            ('+', _) => (Tok::Op(BinOp::Add), 1),
            ('-', _) => (Tok::Minus, 1),
            ('*', _) => (Tok::Op(BinOp::Mul), 1),
            ('/', _) => (Tok::Op(BinOp::Div), 1),
            ('!', _) => (Tok::Bang, 1),
            ('(', _) => (Tok::LParen, 1),
            (')', _) => (Tok::RParen, 1),
            (',', _) => (Tok::Comma, 1),
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    let exp_sign = (d == '+' || d == '-')
                        && j > start
                        && matches!(bytes[j - 1], b'e' | b'E');
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exp_sign {
                        j += 1;
                    } else {
                        break;
                    }
                }
                let text = &src[start..j];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| Error::Expression(format!("invalid number '{text}'")))?;
                (Tok::Num(n), j - start)
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut j = i;
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                    j += 1;
                }
                (Tok::Ident(src[start..j].to_string()), j - start)
            }
            _ => return Err(Error::Expression(format!("unexpected character '{c}' at {i}"))),
        };
        out.push(tok);
        i += width;
    }
    Ok(out)
}

// ── Parser (precedence climbing) ───────────────────────────────

/// Nesting limit for parentheses, unary operators and call arguments.
const MAX_DEPTH: usize = 64;

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
    depth: usize,
    seen: Vec<Observable>,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += usize::from(t.is_some());
        t
    }

    fn expect(&mut self, want: Tok) -> Result<()> {
        match self.bump() {
            Some(t) if t == want => Ok(()),
            got => Err(Error::Expression(format!("expected {want:?}, found {got:?}"))),
        }
    }

    fn infix(&self) -> Option<BinOp> {
        match self.peek()? {
            Tok::Op(op) => Some(*op),
            Tok::Minus => Some(BinOp::Sub),
            _ => None,
        }
    }

    fn expr(&mut self, min_power: u8) -> Result<Node> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::Expression(format!("nesting deeper than {MAX_DEPTH}")));
        }
        self.depth += 1;
        let node = self.climb(min_power);
        self.depth -= 1;
        node
    }

    fn climb(&mut self, min_power: u8) -> Result<Node> {
        let mut lhs = self.prefix()?;
        while let Some(op) = self.infix() {
            let power = op.binding_power();
            if power <= min_power {
                break;
            }
            self.bump();
            let rhs = self.expr(power)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Node> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Node::Const(n)),
            Some(Tok::Minus) => Ok(Node::Neg(Box::new(self.expr(PREFIX_POWER)?))),
            Some(Tok::Bang) => Ok(Node::Not(Box::new(self.expr(PREFIX_POWER)?))),
            Some(Tok::LParen) => {
                let inner = self.expr(0)?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) if matches!(self.peek(), Some(Tok::LParen)) => self.call(&name),
            Some(Tok::Ident(name)) => {
                let obs = Observable::from_name(&name)
                    .ok_or_else(|| Error::Expression(format!("unknown observable '{name}'")))?;
                if !self.seen.contains(&obs) {
                    self.seen.push(obs);
                }
                Ok(Node::Obs(obs))
            }
            got => Err(Error::Expression(format!("expected a value, found {got:?}"))),
        }
    }

    fn call(&mut self, name: &str) -> Result<Node> {
        let func = Func::parse(name)
            .ok_or_else(|| Error::Expression(format!("unknown function '{name}'")))?;
        self.expect(Tok::LParen)?;
        let mut args = vec![self.expr(0)?];
        while matches!(self.peek(), Some(Tok::Comma)) {
            self.bump();
            args.push(self.expr(0)?);
        }
        self.expect(Tok::RParen)?;
        if args.len() != func.arity() {
            return Err(Error::Expression(format!(
                "{name}() takes {} argument(s), got {}",
                func.arity(),
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }
}

fn eval(node: &Node, ev: &Event) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Obs(o) => o.value(ev),
        Node::Neg(a) => -eval(a, ev),
        Node::Not(a) => {
            if eval(a, ev) > 0.0 {
                0.0
            } else {
                1.0
            }
        }
        Node::Binary(op, a, b) => op.apply(eval(a, ev), eval(b, ev)),
        Node::Call(f, args) => {
            let x = eval(&args[0], ev);
            match f {
                Func::Abs => x.abs(),
                Func::Sqrt => x.sqrt(),
                Func::Log => x.ln(),
                Func::Exp => x.exp(),
                Func::Pow => x.powf(eval(&args[1], ev)),
                Func::Min => x.min(eval(&args[1], ev)),
                Func::Max => x.max(eval(&args[1], ev)),
            }
        }
    }
}

/// A compiled selection expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    root: Node,
    observables: Vec<Observable>,
}

impl CompiledExpr {
    /// Parse an expression, resolving every identifier.
    pub fn compile(source: &str) -> Result<Self> {
        let mut parser = Parser { toks: lex(source)?, pos: 0, depth: 0, seen: Vec::new() };
        if parser.toks.is_empty() {
            return Err(Error::Expression("empty expression".into()));
        }
        let root = parser.expr(0)?;
        if let Some(extra) = parser.peek() {
            return Err(Error::Expression(format!("trailing input at {extra:?} in '{source}'")));
        }
        Ok(Self { source: source.to_string(), root, observables: parser.seen })
    }

    /// The expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Observables referenced, in order of first use.
    pub fn observables(&self) -> &[Observable] {
        &self.observables
    }

    /// Numeric value on an event.
    pub fn eval(&self, ev: &Event) -> f64 {
        eval(&self.root, ev)
    }

    /// Whether the expression is true (> 0) on an event.
    pub fn passes(&self, ev: &Event) -> bool {
        self.eval(ev) > 0.0
    }
}
