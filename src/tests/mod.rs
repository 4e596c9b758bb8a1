mod scope_index;
