mod test_read_through;
