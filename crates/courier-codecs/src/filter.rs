//! Marshaller 过滤链。
//!
//! # 设计背景（Why）
//! - 同一个 Marshaller 往往服务一类值（所有包、所有枚举），按具体类型逐一注册并不现实；
//!   过滤器以谓词的形式声明“我接受哪些值”，协议按注册顺序询问，第一个接受者胜出。
//! - [`FilterDecision::AcceptedAndCache`] 允许把结果按具体类型记入缓存，之后同类型的值
//!   不再经过过滤链。
//!
//! # 使用方式（How）
//! - 任何 `Fn(&dyn Object) -> FilterDecision` 闭包都是过滤器；
//! - 只面向单一类型时使用 [`TypeFilter`]。

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::object::{ClassKey, Object};

/// 过滤器对一个值的判定结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterDecision {
    /// 不接受，交给下一个过滤器。
    Next,
    /// 接受，但不缓存。
    Accepted,
    /// 接受，并以值的具体类型为键缓存结果。
    AcceptedAndCache,
}

/// 判断某个 Marshaller 是否适用于给定的值。
pub trait MarshallerFilter: Send + Sync {
    fn accept(&self, value: &dyn Object) -> FilterDecision;
}

impl<F> MarshallerFilter for F
where
    F: Fn(&dyn Object) -> FilterDecision + Send + Sync,
{
    fn accept(&self, value: &dyn Object) -> FilterDecision {
        self(value)
    }
}

/// 只接受类型 `T` 的过滤器，判定结果总是可缓存的。
pub struct TypeFilter<T>(PhantomData<fn() -> T>);

impl<T: Object> TypeFilter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Object> Default for TypeFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypeFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeFilter<{}>", std::any::type_name::<T>())
    }
}

impl<T: Object> MarshallerFilter for TypeFilter<T> {
    fn accept(&self, value: &dyn Object) -> FilterDecision {
        if value.is::<T>() {
            FilterDecision::AcceptedAndCache
        } else {
            FilterDecision::Next
        }
    }
}

/// 协议构建时按登记类型生成的过滤器，包、可编组类型与枚举各一个。
#[derive(Debug, Default)]
pub(crate) struct KindFilter {
    decisions: HashMap<ClassKey, FilterDecision>,
}

impl KindFilter {
    pub(crate) fn insert(&mut self, class: ClassKey, decision: FilterDecision) {
        self.decisions.insert(class, decision);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

impl MarshallerFilter for KindFilter {
    fn accept(&self, value: &dyn Object) -> FilterDecision {
        self.decisions
            .get(&value.class())
            .copied()
            .unwrap_or(FilterDecision::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_filter_matches_exact_type() {
        let filter = TypeFilter::<i64>::new();
        assert_eq!(filter.accept(&7_i64), FilterDecision::AcceptedAndCache);
        assert_eq!(filter.accept(&7_i32), FilterDecision::Next);
    }

    #[test]
    fn closures_act_as_filters() {
        let filter = |value: &dyn Object| {
            if value.downcast_ref::<String>().is_some_and(|s| s.starts_with('#')) {
                FilterDecision::Accepted
            } else {
                FilterDecision::Next
            }
        };
        assert_eq!(filter.accept(&String::from("#tag")), FilterDecision::Accepted);
        assert_eq!(filter.accept(&String::from("tag")), FilterDecision::Next);
    }

    #[test]
    fn kind_filter_answers_from_its_table() {
        let mut filter = KindFilter::default();
        assert!(filter.is_empty());
        filter.insert(ClassKey::of::<bool>(), FilterDecision::Accepted);
        assert_eq!(filter.accept(&true), FilterDecision::Accepted);
        assert_eq!(filter.accept(&1_u8), FilterDecision::Next);
    }
}
