//! Dense integer identifiers for the enumerated objects of a solve.
//!
//! Every j-combination, s-subset and candidate group receives the index it had in its
//! enumeration. Maps between them are then plain `Vec`s indexed by these ids.

#[macro_export]
macro_rules! id_type {
    ($(#[$meta:meta])* $type_name:ident) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
        pub struct $type_name(u32);

        impl $type_name {
            pub const fn from_u32(u: u32) -> Self {
                $type_name(u)
            }

            pub const fn to_u32(self) -> u32 {
                self.0
            }

            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $type_name {
            fn from(u: usize) -> Self {
                debug_assert!(u <= u32::MAX as usize);
                $type_name(u as u32)
            }
        }

        impl From<$type_name> for usize {
            fn from(v: $type_name) -> Self {
                v.0 as usize
            }
        }

        impl std::fmt::Display for $type_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", stringify!($type_name), self.0)
            }
        }

        impl<V> std::ops::Index<$type_name> for Vec<V> {
            type Output = V;

            fn index(&self, index: $type_name) -> &Self::Output {
                &self[usize::from(index)]
            }
        }

        impl<V> std::ops::IndexMut<$type_name> for Vec<V> {
            fn index_mut(&mut self, index: $type_name) -> &mut Self::Output {
                &mut self[usize::from(index)]
            }
        }
    };
}

id_type!(
    /// Position of a j-combination in the lexicographic enumeration of the universe.
    JId
);
id_type!(
    /// Position of an s-subset in the lexicographic enumeration of the universe.
    SId
);
id_type!(
    /// Position of a candidate k-group in the lexicographic enumeration of the universe.
    GroupId
);

/// Iterator over the ids `0..len`.
pub fn ids<I: From<usize>>(len: usize) -> impl Iterator<Item = I> + Clone {
    (0..len).map(I::from)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversions() {
        let id = SId::from(12usize);
        assert_eq!(id.to_u32(), 12);
        assert_eq!(usize::from(id), 12);
        assert_eq!(id.to_string(), "SId12");
        let v = vec!['a', 'b', 'c'];
        assert_eq!(v[JId::from_u32(2)], 'c');
        let collected: Vec<GroupId> = ids(3).collect();
        assert_eq!(collected, vec![GroupId(0), GroupId(1), GroupId(2)]);
    }
}
