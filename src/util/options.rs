use crate::util::constants::BYTES_IN_KBYTE;
use std::default::Default;

fn always_valid<T>(_: &T) -> bool {
    true
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// The set of tunables for a marking cycle. An instance is created
        /// with [`Options::default`] and handed to the coordinator; it is
        /// never mutated afterwards.
        pub struct Options {
            $($(#[$outer])*pub $name: $type),*
        }
        impl Options {
            /// Set an option from a key/value string pair. Returns true if
            /// the value parsed and validated; otherwise the old value is
            /// kept.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(ref val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = val.clone();
                        } else {
                            eprintln!("Warn: unable to set {}={:?}. Invalid value. Default value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        eprintln!("Warn: unable to set {}={:?}. Cant parse value. Default value will be used.", s, val);
                        false
                    })*
                    _ => panic!("Invalid Options key: {}", s)
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Options {
                    $($name: $default),*
                };

                // Env vars that start with TRIMARK_ and match an option name
                // (such as TRIMARK_BYTES_PER_BATCH) override the default.
                const PREFIX: &str = "TRIMARK_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { options.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
                options
            }
        }
    ]
}

options! {
    /// Run marking tasks on background threads. When disabled, scheduling
    /// and pausing are no-ops and all marking is left to the foreground.
    concurrent_marking:       bool  [always_valid] = true,
    /// Log a line per marking task with bytes marked and elapsed time.
    trace_concurrent_marking: bool  [always_valid] = false,
    /// Bytes a task may mark before it checks for a pause request.
    bytes_per_batch:          usize [|v: &usize| *v > 0] = 64 * BYTES_IN_KBYTE,
    /// Objects a task may visit before it checks for a pause request.
    objects_per_batch:        usize [|v: &usize| *v > 0] = 1000,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::default();
        assert!(options.concurrent_marking);
        assert!(!options.trace_concurrent_marking);
        assert_eq!(options.bytes_per_batch, 64 * BYTES_IN_KBYTE);
        assert_eq!(options.objects_per_batch, 1000);
    }

    #[test]
    fn set_from_str_rejects_invalid() {
        let mut options = Options::default();
        assert!(options.set_from_str("objects_per_batch", "16"));
        assert_eq!(options.objects_per_batch, 16);
        // Zero fails the validator and leaves the old value in place.
        assert!(!options.set_from_str("objects_per_batch", "0"));
        assert_eq!(options.objects_per_batch, 16);
        assert!(!options.set_from_str("concurrent_marking", "not-a-bool"));
    }
}
