mod utilities;
