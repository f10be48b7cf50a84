//! 跨版本的结构化复制
//!
//! 相邻版本中结构相同但名义不同的类型，通过 `Retag` 逐字段复制。
//! 宏中列出的字段必须覆盖目标类型的全部字段，遗漏会在编译期报错。

use std::collections::BTreeMap;

/// 把一个版本的值重新标记为另一个版本的同构类型
pub trait Retag<T> {
    fn retag(self) -> T;
}

impl<A: Retag<B>, B> Retag<Vec<B>> for Vec<A> {
    fn retag(self) -> Vec<B> {
        self.into_iter().map(Retag::retag).collect()
    }
}

impl<A: Retag<B>, B> Retag<Option<B>> for Option<A> {
    fn retag(self) -> Option<B> {
        self.map(Retag::retag)
    }
}

impl<K: Ord, A: Retag<B>, B> Retag<BTreeMap<K, B>> for BTreeMap<K, A> {
    fn retag(self) -> BTreeMap<K, B> {
        self.into_iter().map(|(k, v)| (k, v.retag())).collect()
    }
}

/// 为两个同构结构体生成双向 `Retag`
///
/// `copy` 中的字段直接移动，`retag` 中的字段递归转换。
macro_rules! retag_struct {
    ($a:path, $b:path { copy: [$($c:ident),* $(,)?], retag: [$($r:ident),* $(,)?] $(,)? }) => {
        retag_struct!(@one $a, $b { copy: [$($c),*], retag: [$($r),*] });
        retag_struct!(@one $b, $a { copy: [$($c),*], retag: [$($r),*] });
    };
    (@one $a:path, $b:path { copy: [$($c:ident),*], retag: [$($r:ident),*] }) => {
        impl $crate::conversion::retag::Retag<$b> for $a {
            #[allow(unused_imports)]
            fn retag(self) -> $b {
                use $crate::conversion::retag::Retag as _;
                type Target = $b;
                Target {
                    $($c: self.$c,)*
                    $($r: self.$r.retag(),)*
                }
            }
        }
    };
}

/// 为两个取值相同的枚举生成双向 `Retag`
macro_rules! retag_enum {
    ($a:path, $b:path { $($v:ident),* $(,)? }) => {
        impl $crate::conversion::retag::Retag<$b> for $a {
            fn retag(self) -> $b {
                type Target = $b;
                match self {
                    $(Self::$v => Target::$v,)*
                }
            }
        }

        impl $crate::conversion::retag::Retag<$a> for $b {
            fn retag(self) -> $a {
                type Target = $a;
                match self {
                    $(Self::$v => Target::$v,)*
                }
            }
        }
    };
}

pub(crate) use retag_enum;
pub(crate) use retag_struct;
