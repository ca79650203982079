use state_machines::state_machine;

state_machine! {
    name: DocumentMachine,
    state: DocumentState,
    initial: Received,
    states: [
        Received,
        Parsed,
        KeysExtracted,
        DuplicateChecked,
        Normalized,
        Persisted,
        Rendered,
        Attached,
        Done,
        Failed
    ],
    events {
        parse { transition: { from: Received, to: Parsed } }
        extract_keys { transition: { from: Parsed, to: KeysExtracted } }
        check_duplicates { transition: { from: KeysExtracted, to: DuplicateChecked } }
        normalize { transition: { from: DuplicateChecked, to: Normalized } }
        persist { transition: { from: Normalized, to: Persisted } }
        render { transition: { from: Persisted, to: Rendered } }
        attach { transition: { from: Rendered, to: Attached } }
        complete { transition: { from: Attached, to: Done } }
        abort {
            transition: { from: Received, to: Failed }
            transition: { from: Parsed, to: Failed }
            transition: { from: KeysExtracted, to: Failed }
            transition: { from: DuplicateChecked, to: Failed }
            transition: { from: Normalized, to: Failed }
            transition: { from: Persisted, to: Failed }
            transition: { from: Rendered, to: Failed }
            transition: { from: Attached, to: Failed }
        }
    }
}

pub fn received() -> DocumentMachine<(), Received> {
    DocumentMachine::new(())
}
