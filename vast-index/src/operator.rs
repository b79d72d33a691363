#[cfg(test)]
use test_log::test;

/// The closed set of relational predicates a value index can be asked
/// to evaluate. Anything outside this set is a caller bug, not a new
/// feature to add here.
///
/// `In` and `Ni` are not a negated pair — they differ in which side
/// holds the container: `In` asks whether the stored scalar is a
/// member of a queried container, `Ni` asks whether a queried scalar is
/// a member of the stored container (or substring of a stored string,
/// or covered by a stored subnet). Each still has its own negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    Ni,
    NotNi,
    Match,
    NotMatch,
}

impl Operator {
    /// `op` such that `lookup(op.negate(), v) == !lookup(op, v)` whenever
    /// no null-masking is involved.
    pub fn negate(self) -> Operator {
        use Operator::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            Less => GreaterEqual,
            LessEqual => Greater,
            Greater => LessEqual,
            GreaterEqual => Less,
            In => NotIn,
            NotIn => In,
            Ni => NotNi,
            NotNi => Ni,
            Match => NotMatch,
            NotMatch => Match,
        }
    }
}

#[test]
fn negate_is_involution() {
    use Operator::*;
    for op in [
        Equal,
        NotEqual,
        Less,
        LessEqual,
        Greater,
        GreaterEqual,
        In,
        NotIn,
        Ni,
        NotNi,
        Match,
        NotMatch,
    ] {
        assert_eq!(op.negate().negate(), op);
    }
}
