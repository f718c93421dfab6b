use serde::{Deserialize, Serialize};
use shrinkwraprs::Shrinkwrap;

macro_rules! impl_primitive_num {
    (pub struct $outer:ident($tname:ty)) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            Serialize,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Deserialize,
            Shrinkwrap,
        )]
        pub struct $outer(pub $tname);

        impl std::fmt::Display for $outer {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

// Amounts of STRK in its smallest unit
impl_primitive_num!(pub struct Fri(u128));
impl_primitive_num!(pub struct Tip(u64));

impl Fri {
    /// 0.5 STRK
    pub const MIN_DECLARE_FEE: Fri = Fri(500_000_000_000_000_000);
}

impl Tip {
    pub const DEVNET: Tip = Tip(1000);
}
